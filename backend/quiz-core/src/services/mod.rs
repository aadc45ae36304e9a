use std::sync::Arc;

use anyhow::Context;
use mongodb::Client as MongoClient;

use crate::config::Config;
use crate::error::{QuizError, QuizResult};
use crate::models::Learner;
use crate::oracle::{ChatCompletionOracle, Oracle};
use crate::store::{MongoStore, QuizStore};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

pub mod category_mapper;
pub mod diagnosis_service;
pub mod explanation_service;
pub mod favorite_service;
pub mod mistake_service;
pub mod reporting_service;
pub mod session_service;

pub use category_mapper::{CategoryTable, CATCH_ALL_CATEGORY};
pub use diagnosis_service::DiagnosisService;
pub use explanation_service::ExplanationService;
pub use favorite_service::FavoriteService;
pub use mistake_service::MistakeService;
pub use reporting_service::ReportingService;
pub use session_service::SessionService;

/// Shared collaborators of the quiz core.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn QuizStore>,
    pub oracle: Arc<dyn Oracle>,
    pub categories: Arc<CategoryTable>,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let store = MongoStore::new(mongo_client, &config.mongo_database);

        tracing::info!("Ensuring MongoDB indexes...");
        retry_async_with_config(RetryConfig::default(), || store.ensure_indexes())
            .await
            .context("Failed to create MongoDB indexes")?;
        tracing::info!("MongoDB indexes ready");

        let oracle = ChatCompletionOracle::new(&config.oracle)?;

        let categories = match config.category_table_path.as_deref() {
            Some(path) => {
                tracing::info!("Loading category table from {}", path);
                CategoryTable::load_from_file(path)
                    .map_err(|e| QuizError::Config(format!("{:#}", e)))?
            }
            None => CategoryTable::default(),
        };

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(oracle),
            categories,
        ))
    }

    /// Wires explicit collaborators, e.g. an in-memory store and a scripted
    /// oracle.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn QuizStore>,
        oracle: Arc<dyn Oracle>,
        categories: CategoryTable,
    ) -> Self {
        Self {
            config,
            store,
            oracle,
            categories: Arc::new(categories),
        }
    }

    pub fn sessions(&self) -> SessionService {
        SessionService::new(self.store.clone())
    }

    pub fn reporting(&self) -> ReportingService {
        ReportingService::new(self.store.clone())
    }

    pub fn mistakes(&self) -> MistakeService {
        MistakeService::new(self.store.clone())
    }

    pub fn diagnosis(&self) -> DiagnosisService {
        DiagnosisService::new(
            self.store.clone(),
            self.oracle.clone(),
            self.categories.clone(),
            self.config.oracle.call_budget(),
        )
    }

    pub fn explanations(&self) -> ExplanationService {
        ExplanationService::new(
            self.store.clone(),
            self.oracle.clone(),
            self.config.oracle.call_budget(),
        )
    }

    pub fn favorites(&self) -> FavoriteService {
        FavoriteService::new(self.store.clone())
    }
}

/// Resolves the learner every learner-scoped operation starts with.
pub(crate) async fn require_learner(
    store: &dyn QuizStore,
    learner_id: &str,
) -> QuizResult<Learner> {
    store
        .find_learner(learner_id)
        .await?
        .ok_or_else(|| QuizError::UnknownLearner(learner_id.to_string()))
}
