use crate::core::{Kind, Route};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::{
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub(crate) struct ReconcileMetrics {
    reconciles: Family<RouteLabels, Counter>,
    failures: Family<RouteLabels, Counter>,
    applied: Family<KindLabels, Counter>,
    pruned: Family<KindLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct RouteLabels {
    route: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct KindLabels {
    kind: &'static str,
}

// === ReconcileMetrics ===

impl ReconcileMetrics {
    pub(crate) fn register(reg: &mut Registry) -> Self {
        let reconciles = Family::<RouteLabels, Counter>::default();
        reg.register(
            "reconciles",
            "Total number of reconciles started",
            reconciles.clone(),
        );

        let failures = Family::<RouteLabels, Counter>::default();
        reg.register(
            "failures",
            "Total number of reconciles that failed and were requeued",
            failures.clone(),
        );

        let applied = Family::<KindLabels, Counter>::default();
        reg.register(
            "applied",
            "Total number of child objects applied",
            applied.clone(),
        );

        let pruned = Family::<KindLabels, Counter>::default();
        reg.register(
            "pruned",
            "Total number of stale child objects deleted",
            pruned.clone(),
        );

        Self {
            reconciles,
            failures,
            applied,
            pruned,
        }
    }

    pub(crate) fn reconcile(&self, route: Route) {
        self.reconciles
            .get_or_create(&RouteLabels {
                route: route.as_str(),
            })
            .inc();
    }

    pub(crate) fn failure(&self, route: Route) {
        self.failures
            .get_or_create(&RouteLabels {
                route: route.as_str(),
            })
            .inc();
    }

    pub(crate) fn applied(&self, kind: Kind) {
        self.applied
            .get_or_create(&KindLabels {
                kind: kind.as_str(),
            })
            .inc();
    }

    pub(crate) fn pruned(&self, kind: Kind, n: u64) {
        if n == 0 {
            return;
        }
        self.pruned
            .get_or_create(&KindLabels {
                kind: kind.as_str(),
            })
            .inc_by(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_counters() {
        let mut prom = Registry::default();
        let metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));
        metrics.reconcile(Route::ManagedService);
        metrics.reconcile(Route::ManagedService);
        metrics.failure(Route::ProjectPolicy);
        metrics.applied(Kind::Server);
        metrics.pruned(Kind::AuthorizationPolicy, 3);
        metrics.pruned(Kind::Server, 0);

        let mut out = String::new();
        prometheus_client::encoding::text::encode(&mut out, &prom).unwrap();
        assert!(
            out.contains("reconcile_reconciles_total{route=\"managed-service\"} 2"),
            "{out}"
        );
        assert!(
            out.contains("reconcile_failures_total{route=\"project-policy\"} 1"),
            "{out}"
        );
        assert!(out.contains("reconcile_applied_total{kind=\"Server\"} 1"), "{out}");
        assert!(
            out.contains("reconcile_pruned_total{kind=\"AuthorizationPolicy\"} 3"),
            "{out}"
        );
        assert!(!out.contains("reconcile_pruned_total{kind=\"Server\"}"), "{out}");
    }
}
