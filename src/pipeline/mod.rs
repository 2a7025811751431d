pub mod rolling;
pub mod sampler;
pub mod scheduler;

pub use rolling::{MetricsSummary, RollingMetrics};
pub use sampler::{FrameSampler, SamplerStats};
pub use scheduler::{
    CandidateSink, InferenceScheduler, SchedulerOptions, SchedulerStats, SubmitOutcome,
};
