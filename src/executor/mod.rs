//! Event-processing runtime.
//!
//! A processor is compiled into an [`Executor`] (filters, transformation, action) and
//! admitted into the [`ExecutorRegistry`] under its bridge. The [`EventDispatcher`] hands
//! each incoming event to every executor of the target bridge.

pub mod action;
#[allow(clippy::module_inception)]
pub mod executor;
pub mod filter;
pub mod registry;
pub mod transformation;

pub use action::{ActionInvoker, ActionProviderFactory, DefaultActionProviderFactory};
pub use executor::{Executor, ExecutorFactory, ProcessOutcome};
pub use filter::{FilterEvaluator, FilterEvaluatorFactory, FilterSet, StringFilterEvaluatorFactory};
pub use registry::{
    DispatchReport, EventDispatcher, ExecutorDeploymentManager, ExecutorRegistry, ExecutorsProvider,
};
pub use transformation::{
    TemplateEvaluatorFactory, TransformationEvaluator, TransformationEvaluatorFactory,
};
