use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, IntCounterVec, register_counter, register_gauge,
    register_histogram, register_int_counter_vec,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("chronicles_requests_total", "Total number of API requests").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "chronicles_request_latency_seconds",
        "API request latency in seconds"
    )
    .unwrap();
    pub static ref TOKENS_ISSUED: IntCounterVec = register_int_counter_vec!(
        "chronicles_live_tokens_issued_total",
        "Live room tokens issued, by role",
        &["role"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_REJECTIONS: Counter = register_counter!(
        "chronicles_rate_limit_rejections_total",
        "Attempts rejected by the rate limiter"
    )
    .unwrap();
    pub static ref RATE_LIMIT_KEYS: Gauge = register_gauge!(
        "chronicles_rate_limit_tracked_keys",
        "Client keys currently tracked by the rate limiter"
    )
    .unwrap();
    pub static ref STORE_ERRORS: Counter =
        register_counter!("chronicles_store_errors_total", "Failed document store queries").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("chronicles_query_cache_hits_total", "Total query cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("chronicles_query_cache_misses_total", "Total query cache misses").unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("chronicles_query_cache_size", "Current number of cached queries").unwrap();
}
