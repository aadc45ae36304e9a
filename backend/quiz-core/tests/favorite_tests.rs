use quizground_core::QuizError;

mod common;

use common::{ScriptedOracle, LEARNER};

#[tokio::test]
async fn test_toggle_stars_and_unstars() {
    let ctx = common::create_test_context(ScriptedOracle::replying("")).await;
    let favorites = ctx.state.favorites();

    assert!(!favorites.is_favorite(LEARNER, "g0").await.unwrap());
    assert!(favorites.toggle(LEARNER, "g0").await.unwrap());
    assert!(favorites.is_favorite(LEARNER, "g0").await.unwrap());

    assert!(!favorites.toggle(LEARNER, "g0").await.unwrap());
    assert!(!favorites.is_favorite(LEARNER, "g0").await.unwrap());
    assert!(favorites.list(LEARNER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_one_favorite_per_question() {
    let ctx = common::create_test_context(ScriptedOracle::replying("")).await;
    let favorites = ctx.state.favorites();

    favorites.toggle(LEARNER, "g0").await.unwrap();
    favorites.toggle(LEARNER, "g1").await.unwrap();
    favorites.toggle(LEARNER, "g2").await.unwrap();
    favorites.toggle(LEARNER, "g2").await.unwrap();
    favorites.toggle(LEARNER, "g2").await.unwrap();

    let listed = favorites.list(LEARNER).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(
        listed.iter().filter(|f| f.question_id == "g2").count(),
        1
    );
    assert!(listed
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at));
}

#[tokio::test]
async fn test_toggle_rejects_unknown_question_and_learner() {
    let ctx = common::create_test_context(ScriptedOracle::replying("")).await;
    let favorites = ctx.state.favorites();

    let err = favorites.toggle(LEARNER, "missing").await.unwrap_err();
    assert!(matches!(err, QuizError::QuestionNotFound(_)));

    let err = favorites.toggle("ghost", "g0").await.unwrap_err();
    assert!(err.requires_reauthentication());
    assert!(favorites.list(LEARNER).await.unwrap().is_empty());
}
