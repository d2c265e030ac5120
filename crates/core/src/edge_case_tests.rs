// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Governance Core
//!
//! Boundary conditions and cross-service flows:
//! - Quota ceilings and window resets (GOV-Q01 to GOV-Q06)
//! - Check-then-act admission flow (GOV-F01, GOV-F02)
//! - Cross-tenant isolation (GOV-I01)

#[cfg(test)]
mod quota_boundary_tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use mealforge_shared::{ActionKind, Plan};

    use crate::error::CoreError;
    use crate::quota::{QuotaDecision, QuotaEngine};
    use crate::usage::tests::harness;

    // =========================================================================
    // GOV-Q01: Free plan, 3 meal generations today - 4th check is denied
    // with reset at the next UTC midnight
    // =========================================================================
    #[tokio::test]
    async fn test_free_plan_daily_ceiling_scenario() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let tenant = h.tenants.create_tenant("Smiths", owner).await.unwrap();
        let quota = QuotaEngine::new(h.pool.clone());

        let now = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap();

        for _ in 0..3 {
            let decision = quota
                .check_quota_at(tenant.id, owner, ActionKind::MealGeneration, now)
                .await
                .unwrap();
            assert!(decision.is_allowed());
            h.meter
                .record_usage_at(
                    tenant.id,
                    owner,
                    ActionKind::MealGeneration,
                    1_000,
                    4,
                    serde_json::json!({}),
                    now,
                )
                .await
                .unwrap();
        }

        let decision = quota
            .check_quota_at(tenant.id, owner, ActionKind::MealGeneration, now)
            .await
            .unwrap();
        let QuotaDecision::Denied { reset_at } = decision else {
            panic!("4th request on the free plan must be denied");
        };
        assert_eq!(reset_at, Utc.with_ymd_and_hms(2026, 8, 31, 0, 0, 0).unwrap());
    }

    // =========================================================================
    // GOV-Q02: One below the ceiling allows, exactly at the ceiling denies
    // =========================================================================
    #[tokio::test]
    async fn test_ceiling_boundary() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let tenant = h.tenants.create_tenant("Smiths", owner).await.unwrap();
        let quota = QuotaEngine::new(h.pool.clone());
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap();

        // 2 of 3 used: allowed with exactly one left after this request
        for _ in 0..2 {
            h.meter
                .record_usage_at(tenant.id, owner, ActionKind::MealGeneration, 1, 0, serde_json::json!({}), now)
                .await
                .unwrap();
        }
        let decision = quota
            .check_quota_at(tenant.id, owner, ActionKind::MealGeneration, now)
            .await
            .unwrap();
        assert_eq!(decision, QuotaDecision::Allowed { remaining: 0 });

        // 3 of 3 used: denied
        h.meter
            .record_usage_at(tenant.id, owner, ActionKind::MealGeneration, 1, 0, serde_json::json!({}), now)
            .await
            .unwrap();
        let decision = quota
            .check_quota_at(tenant.id, owner, ActionKind::MealGeneration, now)
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }

    // =========================================================================
    // GOV-Q03: Yesterday's usage never counts toward today's window
    // =========================================================================
    #[tokio::test]
    async fn test_daily_window_resets() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let tenant = h.tenants.create_tenant("Smiths", owner).await.unwrap();
        let quota = QuotaEngine::new(h.pool.clone());

        let yesterday = Utc.with_ymd_and_hms(2026, 8, 29, 23, 0, 0).unwrap();
        for _ in 0..3 {
            h.meter
                .record_usage_at(tenant.id, owner, ActionKind::MealGeneration, 1, 0, serde_json::json!({}), yesterday)
                .await
                .unwrap();
        }

        // Exhausted yesterday, fresh after midnight
        let denied = quota
            .check_quota_at(tenant.id, owner, ActionKind::MealGeneration, yesterday)
            .await
            .unwrap();
        assert!(!denied.is_allowed());

        let today = Utc.with_ymd_and_hms(2026, 8, 30, 0, 0, 1).unwrap();
        let allowed = quota
            .check_quota_at(tenant.id, owner, ActionKind::MealGeneration, today)
            .await
            .unwrap();
        assert_eq!(allowed, QuotaDecision::Allowed { remaining: 2 });
    }

    // =========================================================================
    // GOV-Q04: Enterprise plans are unbounded
    // =========================================================================
    #[tokio::test]
    async fn test_enterprise_unbounded() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let tenant = h.tenants.create_tenant("BigCo", owner).await.unwrap();
        h.tenants.change_plan(tenant.id, Plan::Enterprise).await.unwrap();
        let quota = QuotaEngine::new(h.pool.clone());

        for _ in 0..10 {
            h.meter
                .record_usage(tenant.id, owner, ActionKind::MealGeneration, 1, 0, serde_json::json!({}))
                .await
                .unwrap();
        }

        let decision = quota
            .check_quota(tenant.id, owner, ActionKind::MealGeneration)
            .await
            .unwrap();
        assert_eq!(decision, QuotaDecision::Allowed { remaining: i64::MAX });
    }

    // =========================================================================
    // GOV-Q05: Monthly actions count over the month and reset on the 1st
    // =========================================================================
    #[tokio::test]
    async fn test_monthly_action_window() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let tenant = h.tenants.create_tenant("Smiths", owner).await.unwrap();
        let quota = QuotaEngine::new(h.pool.clone());

        // Free plan: 30 nutrition analyses per month
        let mid_month = Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).unwrap();
        for _ in 0..30 {
            h.meter
                .record_usage_at(tenant.id, owner, ActionKind::NutritionAnalysis, 1, 0, serde_json::json!({}), mid_month)
                .await
                .unwrap();
        }

        let later_same_month = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let decision = quota
            .check_quota_at(tenant.id, owner, ActionKind::NutritionAnalysis, later_same_month)
            .await
            .unwrap();
        let QuotaDecision::Denied { reset_at } = decision else {
            panic!("31st analysis in the month must be denied");
        };
        assert_eq!(reset_at, Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap());

        let next_month = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 1).unwrap();
        assert!(quota
            .check_quota_at(tenant.id, owner, ActionKind::NutritionAnalysis, next_month)
            .await
            .unwrap()
            .is_allowed());
    }

    // =========================================================================
    // GOV-Q06: enforce() surfaces the denial as a typed error
    // =========================================================================
    #[tokio::test]
    async fn test_enforce_maps_to_error() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let tenant = h.tenants.create_tenant("Smiths", owner).await.unwrap();
        let quota = QuotaEngine::new(h.pool.clone());

        for _ in 0..3 {
            h.meter
                .record_usage(tenant.id, owner, ActionKind::MealGeneration, 1, 0, serde_json::json!({}))
                .await
                .unwrap();
        }

        let err = quota
            .enforce(tenant.id, owner, ActionKind::MealGeneration)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::QuotaExceeded { .. }));

        let err = quota
            .check_quota(Uuid::new_v4(), owner, ActionKind::MealGeneration)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound("tenant")));
    }
}

#[cfg(test)]
mod control_flow_tests {
    use uuid::Uuid;

    use mealforge_shared::ActionKind;

    use crate::cache::{fingerprint, ComputedResponse, ResponseCache};
    use crate::quota::QuotaEngine;
    use crate::usage::tests::harness;

    // =========================================================================
    // GOV-F01: The admission path end to end: authorize -> quota -> cache
    // miss -> paid call -> write-through to cache and meter
    // =========================================================================
    #[tokio::test]
    async fn test_admission_flow_writes_through() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let tenant = h.tenants.create_tenant("Smiths", owner).await.unwrap();
        let quota = QuotaEngine::new(h.pool.clone());
        let cache = ResponseCache::new(h.pool.clone());

        let request = serde_json::json!({"days": 7, "diet": "vegetarian"});
        let key = fingerprint("gpt-4o-mini", &request);

        assert!(quota
            .check_quota(tenant.id, owner, ActionKind::MealGeneration)
            .await
            .unwrap()
            .is_allowed());

        let result = cache
            .get_or_compute(tenant.id, &key, 3_600, || async {
                Ok(ComputedResponse {
                    payload: serde_json::json!({"plan": ["soup", "curry"]}),
                    model: "gpt-4o-mini".into(),
                    tokens: 1_500,
                    cost_cents: 6,
                })
            })
            .await
            .unwrap();
        assert!(!result.from_cache);

        h.meter
            .record_usage(
                tenant.id,
                owner,
                ActionKind::MealGeneration,
                result.entry.tokens,
                result.entry.cost_cents,
                serde_json::json!({"cache_hit": false}),
            )
            .await
            .unwrap();

        let summary = h.meter.summarize(tenant.id).await.unwrap();
        assert_eq!(summary.meals_today, 1);
        assert_eq!(summary.tokens_today, 1_500);
        assert_eq!(summary.cost_today_cents, 6);
        assert_eq!(summary.remaining_quota, 2);

        // Identical request later: served from cache, nothing re-metered
        let replay = cache
            .get_or_compute(tenant.id, &key, 3_600, || async {
                panic!("cached request must not hit upstream")
            })
            .await
            .unwrap();
        assert!(replay.from_cache);
    }

    // =========================================================================
    // GOV-F02: Advisory check-then-act - the documented overshoot window.
    // Both in-flight requests pass the check at 2/3 used; both record.
    // The engine denies from the next check onward, it does not rewrite
    // history.
    // =========================================================================
    #[tokio::test]
    async fn test_check_then_act_overshoot_is_bounded() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let tenant = h.tenants.create_tenant("Smiths", owner).await.unwrap();
        let quota = QuotaEngine::new(h.pool.clone());

        for _ in 0..2 {
            h.meter
                .record_usage(tenant.id, owner, ActionKind::MealGeneration, 1, 0, serde_json::json!({}))
                .await
                .unwrap();
        }

        // Two concurrent admissions both see 2 < 3
        let d1 = quota.check_quota(tenant.id, owner, ActionKind::MealGeneration).await.unwrap();
        let d2 = quota.check_quota(tenant.id, owner, ActionKind::MealGeneration).await.unwrap();
        assert!(d1.is_allowed() && d2.is_allowed());

        for _ in 0..2 {
            h.meter
                .record_usage(tenant.id, owner, ActionKind::MealGeneration, 1, 0, serde_json::json!({}))
                .await
                .unwrap();
        }

        // 4 of 3 recorded; the meter keeps the facts and the next check
        // closes the gate
        let summary = h.meter.summarize(tenant.id).await.unwrap();
        assert_eq!(summary.meals_today, 4);
        assert_eq!(summary.remaining_quota, 0);
        assert!(!quota
            .check_quota(tenant.id, owner, ActionKind::MealGeneration)
            .await
            .unwrap()
            .is_allowed());
    }
}

#[cfg(test)]
mod isolation_tests {
    use uuid::Uuid;

    use mealforge_shared::{ActionKind, MemberRole};

    use crate::cache::ResponseCache;
    use crate::error::CoreError;
    use crate::usage::tests::harness;

    // =========================================================================
    // GOV-I01: A member of one tenant gets nothing from another tenant:
    // no authorization, no usage writes, no cache reads
    // =========================================================================
    #[tokio::test]
    async fn test_cross_tenant_isolation() {
        let h = harness().await;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let smiths = h.tenants.create_tenant("Smiths", alice).await.unwrap();
        let jones = h.tenants.create_tenant("Jones", bob).await.unwrap();
        let cache = ResponseCache::new(h.pool.clone());
        let authz = crate::authz::AuthzService::new(h.pool.clone());

        // Authorization: membership in one tenant grants nothing in another
        let err = authz.authorize(alice, jones.id, MemberRole::Viewer).await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized { .. }));

        // Metering: alice cannot write usage into jones
        let err = h
            .meter
            .record_usage(jones.id, alice, ActionKind::MealGeneration, 1, 0, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized { .. }));

        // Cache: identical fingerprints never cross the tenant boundary
        cache
            .put(smiths.id, "same-prompt", serde_json::json!({"v": 1}), "gpt-4o-mini", 1, 1, 60)
            .await
            .unwrap();
        assert!(cache.get(jones.id, "same-prompt").await.unwrap().is_none());
    }
}
