mod plan;
mod assembler;
pub mod core;

pub use plan::{AdjustmentKind, AdjustmentPlan, PlanEntry, TimingCalculator, TimingMode};
pub use assembler::{AssemblyResult, AssemblyStatus, AudioAssembler, Placement, RenderStatus};
pub use self::core::{SyncCore, SyncOutcome};
