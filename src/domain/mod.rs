//! Core data model shared by every component.

pub mod config;
pub mod ids;
pub mod session;

pub use config::{AssessmentConfig, AssessmentContext, AssessmentSettings, ConceptId, GradeWeights, GradingConfig};
pub use ids::{ConfigId, MessageId, SessionId};
pub use session::{
    Analytics, AuthenticityVerdict, ConceptState, ConceptStatus, IntegrityCheck, IntegrityCheckType,
    IntegrityVerdict, Message, MessageMetadata, MessageRole, Progress, SecurityEnvelope, Session,
    SessionStatus, Timing,
};
