pub mod assessment;
pub mod evaluation;
pub mod loaders;

pub use assessment::{Assessment, Criterion, WorkItem};
pub use evaluation::{
    AbilityEstimate, AbilityRecord, ConfidenceInterval, Evaluation, Judgment,
    NormalizedEvaluation, RawJudgment,
};
pub use loaders::{load_all_toml_files, load_toml_to_assessment};
