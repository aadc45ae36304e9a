use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::TRANSIENT_TRANSACTION_ERROR;
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use uuid::Uuid;

use super::QuizStore;
use crate::models::{
    AnswerInsert, AnswerRecord, AnswerWrite, Explanation, Favorite, Learner, Provenance,
    Question, Topic, WeakTopic, WrongQuestion,
};
use crate::utils::retry::{retry_async_if, RetryConfig};
use crate::utils::time::chrono_to_bson;

const LEARNERS: &str = "learners";
const QUESTIONS: &str = "questions";
const ANSWER_RECORDS: &str = "answer_records";
const WRONG_QUESTIONS: &str = "wrong_questions";
const WEAK_TOPICS: &str = "weak_topics";
const FAVORITES: &str = "favorites";
const EXPLANATIONS: &str = "explanations";

/// MongoDB gateway. Key uniqueness is enforced by unique indexes, created by
/// `ensure_indexes` at startup.
///
/// `record_answer` runs in a multi-document transaction, so the deployment
/// must be a replica set or sharded cluster.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    mongo: Database,
}

impl MongoStore {
    pub fn new(client: Client, database: &str) -> Self {
        let mongo = client.database(database);
        Self { client, mongo }
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.mongo
            .collection::<Document>(ANSWER_RECORDS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "learner_id": 1, "question_id": 1, "session_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create answer_records unique index")?;

        self.mongo
            .collection::<Document>(WRONG_QUESTIONS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "learner_id": 1, "question_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create wrong_questions unique index")?;

        self.mongo
            .collection::<Document>(WEAK_TOPICS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "learner_id": 1, "category": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create weak_topics unique index")?;

        self.mongo
            .collection::<Document>(FAVORITES)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "learner_id": 1, "question_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create favorites unique index")?;

        self.mongo
            .collection::<Document>(QUESTIONS)
            .create_index(IndexModel::builder().keys(doc! { "topic": 1 }).build())
            .await
            .context("Failed to create questions topic index")?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    fn answers(&self) -> Collection<AnswerRecord> {
        self.mongo.collection(ANSWER_RECORDS)
    }

    fn wrong_questions(&self) -> Collection<WrongQuestion> {
        self.mongo.collection(WRONG_QUESTIONS)
    }

    fn weak_topics(&self) -> Collection<WeakTopic> {
        self.mongo.collection(WEAK_TOPICS)
    }

    fn favorites(&self) -> Collection<Favorite> {
        self.mongo.collection(FAVORITES)
    }

    fn explanations(&self) -> Collection<Explanation> {
        self.mongo.collection(EXPLANATIONS)
    }

    /// One transaction attempt. Any failure aborts it, so no partial write
    /// survives.
    async fn record_answer_once(
        &self,
        record: &AnswerRecord,
        question: &Question,
    ) -> mongodb::error::Result<Option<WrongQuestion>> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        match self.write_answer(&mut session, record, question).await {
            Ok(wrong_question) => {
                session.commit_transaction().await?;
                Ok(wrong_question)
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    tracing::debug!("Abort after failed answer write also failed: {}", abort);
                }
                Err(e)
            }
        }
    }

    async fn write_answer(
        &self,
        session: &mut ClientSession,
        record: &AnswerRecord,
        question: &Question,
    ) -> mongodb::error::Result<Option<WrongQuestion>> {
        self.answers().insert_one(record).session(&mut *session).await?;

        let at = chrono_to_bson(record.created_at);
        if record.correct {
            let (filter, update) = fix_wrong_question(&record.learner_id, &question.id, at);
            self.wrong_questions()
                .find_one_and_update(filter, update)
                .return_document(ReturnDocument::After)
                .session(&mut *session)
                .await
        } else {
            let (filter, update) = upsert_wrong_question(&record.learner_id, question, at);
            self.wrong_questions()
                .find_one_and_update(filter, update)
                .upsert(true)
                .return_document(ReturnDocument::After)
                .session(&mut *session)
                .await
        }
    }
}

/// Filter and update refreshing the ledger entry after a mistake.
fn upsert_wrong_question(
    learner_id: &str,
    question: &Question,
    at: mongodb::bson::DateTime,
) -> (Document, Document) {
    (
        doc! { "learner_id": learner_id, "question_id": &question.id },
        doc! {
            "$set": {
                "confirmed": false,
                "fixed": false,
                "fixed_at": Bson::Null,
                "last_wrong_at": at,
                "topic": topic_bson(question.topic),
            },
            "$setOnInsert": {
                "_id": Uuid::new_v4().to_string(),
                "created_at": at,
            },
        },
    )
}

fn fix_wrong_question(
    learner_id: &str,
    question_id: &str,
    at: mongodb::bson::DateTime,
) -> (Document, Document) {
    (
        doc! { "learner_id": learner_id, "question_id": question_id, "fixed": false },
        doc! { "$set": { "fixed": true, "fixed_at": at } },
    )
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
        *err.kind
    {
        return we.code == 11000;
    }
    false
}

fn topic_bson(topic: Topic) -> Bson {
    Bson::String(topic.as_str().to_string())
}

fn provenance_bson(provenance: Provenance) -> Bson {
    match provenance {
        Provenance::Authored => Bson::String("authored".to_string()),
        Provenance::Generated => Bson::String("generated".to_string()),
    }
}

#[async_trait]
impl QuizStore for MongoStore {
    async fn find_learner(&self, learner_id: &str) -> Result<Option<Learner>> {
        self.mongo
            .collection::<Learner>(LEARNERS)
            .find_one(doc! { "_id": learner_id })
            .await
            .context("Failed to query learners")
    }

    async fn insert_question(&self, question: &Question) -> Result<()> {
        self.mongo
            .collection::<Question>(QUESTIONS)
            .insert_one(question)
            .await
            .context("Failed to insert question")?;
        Ok(())
    }

    async fn get_question(&self, question_id: &str) -> Result<Option<Question>> {
        self.mongo
            .collection::<Question>(QUESTIONS)
            .find_one(doc! { "_id": question_id })
            .await
            .context("Failed to query question")
    }

    async fn filter_questions(
        &self,
        topic: Topic,
        include_generated: bool,
    ) -> Result<Vec<Question>> {
        let mut filter = doc! { "topic": topic_bson(topic) };
        if !include_generated {
            // Documents without a provenance field count as authored
            filter.insert(
                "provenance",
                doc! { "$ne": provenance_bson(Provenance::Generated) },
            );
        }

        let cursor = self
            .mongo
            .collection::<Question>(QUESTIONS)
            .find(filter)
            .await
            .context("Failed to query questions")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read question cursor")
    }

    async fn find_answer_record(
        &self,
        learner_id: &str,
        question_id: &str,
        session_id: &str,
    ) -> Result<Option<AnswerRecord>> {
        self.answers()
            .find_one(doc! {
                "learner_id": learner_id,
                "question_id": question_id,
                "session_id": session_id,
            })
            .await
            .context("Failed to query answer_records")
    }

    async fn create_answer_record(&self, record: AnswerRecord) -> Result<AnswerInsert> {
        match self.answers().insert_one(&record).await {
            Ok(_) => Ok(AnswerInsert::Inserted(record)),
            Err(e) if is_duplicate_key(&e) => {
                // Lost the race against a concurrent submission for the same key
                let existing = self
                    .find_answer_record(&record.learner_id, &record.question_id, &record.session_id)
                    .await?
                    .context("Duplicate answer record vanished after conflict")?;
                Ok(AnswerInsert::Existing(existing))
            }
            Err(e) => Err(e).context("Failed to insert answer record"),
        }
    }

    async fn record_answer(
        &self,
        record: AnswerRecord,
        question: &Question,
    ) -> Result<AnswerWrite> {
        let written = retry_async_if(
            RetryConfig::default(),
            || self.record_answer_once(&record, question),
            |e: &mongodb::error::Error| e.contains_label(TRANSIENT_TRANSACTION_ERROR),
        )
        .await;

        match written {
            Ok(wrong_question) => Ok(AnswerWrite {
                insert: AnswerInsert::Inserted(record),
                wrong_question,
            }),
            Err(e) if is_duplicate_key(&e) => {
                let existing = self
                    .find_answer_record(&record.learner_id, &record.question_id, &record.session_id)
                    .await?
                    .context("Duplicate answer record vanished after conflict")?;
                Ok(AnswerWrite::existing(existing))
            }
            Err(e) => Err(e).context("Failed to record answer"),
        }
    }

    async fn answer_records_for_session(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> Result<Vec<AnswerRecord>> {
        let cursor = self
            .answers()
            .find(doc! { "learner_id": learner_id, "session_id": session_id })
            .sort(doc! { "created_at": 1 })
            .await
            .context("Failed to query session answer records")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read answer record cursor")
    }

    async fn answer_records_for_learner(&self, learner_id: &str) -> Result<Vec<AnswerRecord>> {
        let cursor = self
            .answers()
            .find(doc! { "learner_id": learner_id })
            .sort(doc! { "created_at": 1 })
            .await
            .context("Failed to query learner answer records")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read answer record cursor")
    }

    async fn upsert_wrong_question(
        &self,
        learner_id: &str,
        question: &Question,
        at: DateTime<Utc>,
    ) -> Result<WrongQuestion> {
        let (filter, update) = upsert_wrong_question(learner_id, question, chrono_to_bson(at));
        self.wrong_questions()
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to upsert wrong question")?
            .context("Upserted wrong question not returned")
    }

    async fn mark_wrong_question_fixed(
        &self,
        learner_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<WrongQuestion>> {
        let (filter, update) = fix_wrong_question(learner_id, question_id, chrono_to_bson(at));
        self.wrong_questions()
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to mark wrong question fixed")
    }

    async fn filter_wrong_questions(
        &self,
        learner_id: &str,
        confirmed: bool,
        topic: Option<Topic>,
    ) -> Result<Vec<WrongQuestion>> {
        let mut filter = doc! { "learner_id": learner_id, "confirmed": confirmed };
        if let Some(topic) = topic {
            filter.insert("topic", topic_bson(topic));
        }

        let cursor = self
            .wrong_questions()
            .find(filter)
            .sort(doc! { "last_wrong_at": -1 })
            .await
            .context("Failed to query wrong questions")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read wrong question cursor")
    }

    async fn confirm_wrong_question(
        &self,
        learner_id: &str,
        question_id: &str,
        note: Option<String>,
    ) -> Result<Option<WrongQuestion>> {
        let mut set = doc! { "confirmed": true };
        if let Some(note) = note {
            set.insert("note", note);
        }

        self.wrong_questions()
            .find_one_and_update(
                doc! { "learner_id": learner_id, "question_id": question_id },
                doc! { "$set": set },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to confirm wrong question")
    }

    async fn upsert_weak_topic(
        &self,
        learner_id: &str,
        category: &str,
        at: DateTime<Utc>,
    ) -> Result<WeakTopic> {
        self.weak_topics()
            .find_one_and_update(
                doc! { "learner_id": learner_id, "category": category },
                doc! {
                    "$set": { "last_diagnosed": chrono_to_bson(at) },
                    "$setOnInsert": { "_id": Uuid::new_v4().to_string() },
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to upsert weak topic")?
            .context("Upserted weak topic not returned")
    }

    async fn list_weak_topics(&self, learner_id: &str) -> Result<Vec<WeakTopic>> {
        let cursor = self
            .weak_topics()
            .find(doc! { "learner_id": learner_id })
            .sort(doc! { "last_diagnosed": -1, "category": 1 })
            .await
            .context("Failed to query weak topics")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read weak topic cursor")
    }

    async fn toggle_favorite(
        &self,
        learner_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let removed = self
            .favorites()
            .delete_one(doc! { "learner_id": learner_id, "question_id": question_id })
            .await
            .context("Failed to remove favorite")?;
        if removed.deleted_count > 0 {
            return Ok(false);
        }

        let favorite = Favorite {
            id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            question_id: question_id.to_string(),
            created_at: at,
        };
        match self.favorites().insert_one(&favorite).await {
            Ok(_) => Ok(true),
            // A concurrent toggle starred it first
            Err(e) if is_duplicate_key(&e) => Ok(true),
            Err(e) => Err(e).context("Failed to insert favorite"),
        }
    }

    async fn is_favorite(&self, learner_id: &str, question_id: &str) -> Result<bool> {
        let count = self
            .favorites()
            .count_documents(doc! { "learner_id": learner_id, "question_id": question_id })
            .await
            .context("Failed to query favorites")?;
        Ok(count > 0)
    }

    async fn list_favorites(&self, learner_id: &str) -> Result<Vec<Favorite>> {
        let cursor = self
            .favorites()
            .find(doc! { "learner_id": learner_id })
            .sort(doc! { "created_at": -1 })
            .await
            .context("Failed to query favorites")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read favorite cursor")
    }

    async fn find_explanation(&self, question_id: &str) -> Result<Option<Explanation>> {
        self.explanations()
            .find_one(doc! { "_id": question_id })
            .await
            .context("Failed to query explanations")
    }

    async fn save_explanation(&self, explanation: Explanation) -> Result<Explanation> {
        match self.explanations().insert_one(&explanation).await {
            Ok(_) => Ok(explanation),
            Err(e) if is_duplicate_key(&e) => self
                .find_explanation(&explanation.question_id)
                .await?
                .context("Cached explanation vanished after conflict"),
            Err(e) => Err(e).context("Failed to insert explanation"),
        }
    }
}
