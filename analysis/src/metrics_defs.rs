use shared::metrics_defs::{MetricDef, MetricType};

pub const MAINTENANCE_RUNS: MetricDef = MetricDef {
    name: "analysis.maintenance.runs",
    metric_type: MetricType::Counter,
    description: "Completed maintenance passes",
};

pub const MAINTENANCE_FAILURES: MetricDef = MetricDef {
    name: "analysis.maintenance.failures",
    metric_type: MetricType::Counter,
    description: "Maintenance passes that failed and will be retried",
};

pub const PURGED_ANALYSES: MetricDef = MetricDef {
    name: "analysis.maintenance.purged",
    metric_type: MetricType::Counter,
    description: "Analyses removed by retention purge",
};

pub const ALL_METRICS: &[MetricDef] = &[MAINTENANCE_RUNS, MAINTENANCE_FAILURES, PURGED_ANALYSES];
