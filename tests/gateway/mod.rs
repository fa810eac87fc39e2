//! Gateway orchestration tests.

mod orchestrator_test;

/// Verify the core types are exported from the library.
#[test]
fn test_all_gateway_types_exported() {
    use promptgate::gateway::{InvocationOutcome, InvocationRequest, Orchestrator};
    use promptgate::resilience::{CircuitBreaker, RetryController, RetryPolicy};
    use promptgate::session::{ConversationTurn, Role, Session, SessionHandle, SessionStore};
    use promptgate::{ErrorKind, GatewayError};

    let _ = RetryPolicy::default();
    let breaker = CircuitBreaker::default();
    let _ = RetryController::new(RetryPolicy::new(1), &breaker);
    let _ = Session::from_turns([ConversationTurn::user("x")]);
    let _ = SessionHandle::detached();
    let _ = SessionStore::default();
    let _ = InvocationRequest::new("m", "p");
    let _ = Role::Assistant;
    let _: fn(&InvocationOutcome) -> bool = InvocationOutcome::is_success;
    let _ = std::mem::size_of::<Orchestrator>();
    assert_eq!(GatewayError::CircuitOpen.kind(), ErrorKind::CircuitOpen);
}
