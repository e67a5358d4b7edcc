//! End-to-end simulation and replay scoring.

use autoagents_llm::LLMProvider;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use vibecheck_rs_config::VibeCheckConfig;
use vibecheck_rs_core::{
    LlmResponseGenerator, NoJitter, PersonaInput, VibeCheck, VibeCheckError, parse_export,
};
use vibecheck_rs_embed::{Embedder, RetryPolicy};
use vibecheck_rs_test_utils::{FailingLLM, ScriptedLLM};

fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2))
}

fn engine(llm: Arc<dyn LLMProvider>) -> VibeCheck {
    let generator = LlmResponseGenerator::new(llm, Duration::from_secs(5), quick_retry());
    VibeCheck::builder(VibeCheckConfig::default())
        .in_memory()
        .embedder(Embedder::fallback(64))
        .generator(Arc::new(generator))
        .jitter(Arc::new(NoJitter))
        .build()
        .expect("engine")
}

async fn index_pair(engine: &VibeCheck) {
    let alice = parse_export(
        r#"["omg the concert last night was unreal", "we should get tacos after",
            "honestly my cat runs this house", "lol yes!! send pics", "going hiking saturday"]"#,
    )
    .expect("alice export");
    let bob = parse_export(
        r#"{"messages": ["Just finished a long run.", "Tacos sound great.",
            "My dog would love your cat.", "Working late again.", "Hiking is my favorite."]}"#,
    )
    .expect("bob export");
    let results = engine
        .index_personas(vec![
            PersonaInput::new("alice", "Alice", alice),
            PersonaInput::new("bob", "Bob", bob),
        ])
        .await;
    for (persona_id, result) in results {
        let persona = result.unwrap_or_else(|err| panic!("index {persona_id}: {err}"));
        assert_eq!(persona.windows.len(), 5);
    }
}

#[tokio::test]
async fn sixteen_turns_then_score_half_way() {
    let llm = ScriptedLLM::new(["haha totally", "that sounds fun", "wait really?"]);
    let engine = engine(Arc::new(llm.clone()));
    index_pair(&engine).await;

    let conversation = engine
        .run_simulation("alice", "bob", None)
        .await
        .expect("simulate");
    assert_eq!(conversation.messages.len(), 16);
    assert_eq!(conversation.starter, None);
    let senders: Vec<_> = conversation
        .messages
        .iter()
        .take(4)
        .map(|message| message.sender_id.as_str())
        .collect();
    assert_eq!(senders, vec!["alice", "bob", "alice", "bob"]);
    assert!(
        conversation
            .messages
            .iter()
            .all(|message| conversation.is_participant(&message.sender_id))
    );
    let seqs: Vec<u64> = conversation.messages.iter().map(|m| m.timestamp_seq).collect();
    assert_eq!(seqs, (1..=16).collect::<Vec<u64>>());
    assert_eq!(llm.calls(), 16);

    let first_prompt = llm.requests.lock()[0][1].content.clone();
    assert!(first_prompt.contains("EXAMPLES OF HOW THIS PERSON RESPONDS"));
    assert!(first_prompt.contains("[1] (similarity "));

    let snapshot = engine.score_at(&conversation, 0.5).expect("score");
    assert_eq!(snapshot.visible_message_count, 8);
    assert_eq!(snapshot.total_messages, 16);
    assert_eq!(snapshot.insights.len(), 5);

    let stored = engine.conversation(conversation.id).expect("stored");
    assert_eq!(stored, conversation);
    assert_eq!(engine.conversations().expect("list").len(), 1);
}

#[tokio::test]
async fn starter_hands_the_first_turn_to_persona_b() {
    let llm = ScriptedLLM::new(["oh hey!"]);
    let engine = engine(Arc::new(llm.clone()));
    index_pair(&engine).await;

    let conversation = engine
        .run_simulation("alice", "bob", Some("  hey you  "))
        .await
        .expect("simulate");
    assert_eq!(conversation.starter.as_deref(), Some("hey you"));
    assert_eq!(conversation.messages.len(), 16);
    assert_eq!(conversation.messages[0].sender_id, "bob");
    assert_eq!(conversation.messages[15].sender_id, "alice");

    let first_prompt = llm.requests.lock()[0][1].content.clone();
    assert!(first_prompt.contains("CURRENT CONVERSATION:\nThem: hey you\n"));
}

#[tokio::test]
async fn generation_failure_discards_the_run() {
    let failing = FailingLLM::new("provider down");
    let engine = engine(Arc::new(failing.clone()));
    index_pair(&engine).await;

    let err = engine
        .run_simulation("alice", "bob", None)
        .await
        .unwrap_err();
    assert!(matches!(err, VibeCheckError::Generation(_)));
    assert_eq!(failing.calls(), 2);
    assert!(engine.conversations().expect("list").is_empty());
}

#[tokio::test]
async fn simulation_needs_two_known_personas() {
    let engine = engine(Arc::new(ScriptedLLM::new(["ok"])));
    index_pair(&engine).await;

    let err = engine
        .run_simulation("alice", "carol", None)
        .await
        .unwrap_err();
    assert!(matches!(err, VibeCheckError::UnknownPersona(id) if id == "carol"));

    let err = engine
        .run_simulation("alice", "alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, VibeCheckError::InvalidInput(_)));
}

#[tokio::test]
async fn engine_without_generator_echoes_persona_lines() {
    let engine = VibeCheck::builder(VibeCheckConfig::default())
        .in_memory()
        .embedder(Embedder::fallback(16))
        .build()
        .expect("engine");
    index_pair(&engine).await;
    let conversation = engine
        .run_simulation("alice", "bob", None)
        .await
        .expect("simulate");
    assert_eq!(conversation.messages.len(), 16);

    let personas = engine.personas().expect("personas");
    for message in &conversation.messages {
        let persona = personas
            .iter()
            .find(|persona| persona.id == message.sender_id)
            .expect("speaker is indexed");
        let own_line = format!("{}: {}", persona.id, message.text);
        let echoed = persona
            .windows
            .iter()
            .any(|window| window.text.lines().any(|line| line == own_line));
        assert!(
            echoed || message.text == "hey" || message.text == "Hey!",
            "unexpected reply from {}: {}",
            persona.id,
            message.text
        );
    }
}
