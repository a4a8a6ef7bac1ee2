pub mod checkpoint;
pub mod controller;
pub mod data_loader;
pub mod epoch;
pub mod history;
pub mod scheduler;
pub mod trainer;

pub use self::checkpoint::{CheckpointManager, ModelCheckpoint};
pub use self::controller::{Controller, EpochSummary, StepOutcome, TrainingState};
pub use self::data_loader::DataLoader;
pub use self::epoch::{eval_epoch, train_epoch, EvalOutcome, VisualSample};
pub use self::history::RunHistory;
pub use self::scheduler::PlateauScheduler;
pub use self::trainer::Trainer;
