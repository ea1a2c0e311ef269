pub mod catalog;
pub mod domain;
pub mod interaction;
pub mod messages;
pub mod ports;
pub mod pricing;
pub mod workflow;

pub use catalog::{DocumentFormat, ServiceKind};
pub use domain::{ConversationSession, DocumentSubmission, ScoreResult, Upload, User};
pub use interaction::{ConversationRef, MessageId, OutboundMessage, UserAction};
pub use ports::{
    ChatTransport, CheckoutRequest, CreditLedger, DatabaseService, ObjectStorage, PaymentService,
    PortError, PortResult, ScoringService, SessionStore, TextExtractionService,
};
pub use workflow::{
    NoRefund, RefundOnFailure, RefundPolicy, SettleOutcome, Turn, Workflow, WorkflowDeps,
    WorkflowError, WorkflowSettings,
};
