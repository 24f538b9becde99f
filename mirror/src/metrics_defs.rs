use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "mirror.request.duration",
    metric_type: MetricType::Histogram,
    description: "End-to-end duration of one mirrored request in milliseconds",
};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "mirror.cache.hit",
    metric_type: MetricType::Counter,
    description: "Response cache hits",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "mirror.cache.miss",
    metric_type: MetricType::Counter,
    description: "Response cache misses",
};

pub const LEG_FAILURES: MetricDef = MetricDef {
    name: "mirror.leg.failures",
    metric_type: MetricType::Counter,
    description: "Backend legs degraded by timeout or transport failure",
};

pub const DIVERGENT_COMPARISONS: MetricDef = MetricDef {
    name: "mirror.comparison.divergent",
    metric_type: MetricType::Counter,
    description: "Comparisons classified as major or critical differences",
};

pub const RECORD_FAILURES: MetricDef = MetricDef {
    name: "mirror.analysis.record_failures",
    metric_type: MetricType::Counter,
    description: "Analysis records that could not be persisted",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    CACHE_HIT,
    CACHE_MISS,
    LEG_FAILURES,
    DIVERGENT_COMPARISONS,
    RECORD_FAILURES,
];
