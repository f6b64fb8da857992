mod common;

use common::{connection, RecordingSource};
use querymesh::ai::types::AiResponse;
use querymesh::intent::VisualizationHint;
use querymesh::{EngineConfig, Orchestrator};

fn orchestrator_with(source: std::sync::Arc<RecordingSource>) -> Orchestrator {
    let orchestrator = Orchestrator::new(EngineConfig::default(), None);
    orchestrator.registry().register(source);
    orchestrator
}

#[tokio::test]
async fn heuristic_count_turn_runs_end_to_end() {
    let source = RecordingSource::new("db-1");
    let orchestrator = orchestrator_with(source.clone());

    let outcome = orchestrator
        .process_message("conv-1", "how many users do we have?", &[connection("db-1")])
        .await;

    let AiResponse::ReadyToExecute(plan) = &outcome.response else {
        panic!("expected an execution plan, got {:?}", outcome.response);
    };
    assert_eq!(plan.intent.as_deref(), Some("COUNT"));
    assert_eq!(plan.data_requests.len(), 1);

    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].result.success);
    assert_eq!(outcome.results[0].connection_id, "db-1");

    let executed = source.executed_queries();
    assert_eq!(executed, vec!["SELECT COUNT(*) AS total_count FROM users t"]);

    // One-row aggregate renders as a KPI card.
    assert_eq!(outcome.visualization, Some(VisualizationHint::KpiCard));
}

#[tokio::test]
async fn no_reachable_sources_is_a_terminal_answer() {
    let orchestrator = Orchestrator::new(EngineConfig::default(), None);

    let outcome = orchestrator.process_message("conv-1", "how many users?", &[]).await;

    let AiResponse::DirectAnswer(answer) = &outcome.response else {
        panic!("expected a terminal answer, got {:?}", outcome.response);
    };
    assert!(answer.content.contains("No schemas"));
    assert!(outcome.results.is_empty());
    assert!(outcome.visualization.is_none());
}

#[tokio::test]
async fn conversation_history_accumulates_across_turns() {
    let source = RecordingSource::new("db-1");
    let orchestrator = orchestrator_with(source);

    orchestrator
        .process_message("conv-1", "how many users do we have?", &[connection("db-1")])
        .await;
    orchestrator
        .process_message("conv-1", "list the users", &[connection("db-1")])
        .await;

    let history = orchestrator.conversations().history("conv-1");
    // Two user turns plus the assistant content recorded after each.
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[1].role, "assistant");
    assert_eq!(history[2].content, "list the users");
}

#[tokio::test]
async fn mutating_question_text_does_not_leak_into_sql() {
    let source = RecordingSource::new("db-1");
    let orchestrator = orchestrator_with(source.clone());

    // The word "delete" in the question must not produce a mutation; the
    // generator only ever emits read queries and the gate backstops it.
    let outcome = orchestrator
        .process_message("conv-1", "delete all users please", &[connection("db-1")])
        .await;

    for query in source.executed_queries() {
        assert!(querymesh::QueryValidator::validate(&query).valid);
    }
    match outcome.response {
        AiResponse::ReadyToExecute(_) | AiResponse::DirectAnswer(_) => {}
        other => panic!("unexpected response {:?}", other),
    }
}
