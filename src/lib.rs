pub mod config;
pub mod controller;
pub mod dom;
pub mod error;
pub mod events;
pub mod identity;
pub mod inference;
pub mod presentation;
pub mod selectors;
pub mod sim;
pub mod state;

pub use config::GateConfig;
pub use controller::{AnswerGateController, AttachMode, Disposition, Handle, UserEvent};
pub use dom::{QuizDom, Timers};
pub use error::{ConfigError, DomError, GateError};
pub use events::{GateEvent, Notice, Notifier};
pub use identity::QuestionId;
pub use state::{Phase, QuestionState};
