// src/config/mod.rs
pub mod pipeline;

pub use pipeline::{
    FetchCfg, LocaleCfg, LocalesCfg, PipelineConfig, RateLimitCfg, SearchCfg, TrackingCfg,
    DEFAULT_PIPELINE_CONFIG_PATH, ENV_PIPELINE_CONFIG_PATH,
};
