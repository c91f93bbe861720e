pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

pub use middleware::require_claimant;
pub use rest::{
    check_in_handler, claimant_patterns_handler, evaluate_handler, security_event_handler,
};
