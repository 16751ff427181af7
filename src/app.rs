use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::source::RedditClient;
use crate::supervisor::{Launcher, Supervisor, SupervisorReport, UnitKind};
use crate::workers::{BackoffPolicy, IngestWorker, Matcher, UpdateWorker};

/// Wires configuration into the units the supervisor manages.
pub struct App {
    config: Arc<Config>,
    matcher: Arc<Matcher>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let pattern = Regex::new(&config.match_pattern)?;
        let matcher = Matcher::new(pattern, &config.excluded_authors, &config.excluded_origins);

        Ok(Self {
            config: Arc::new(config),
            matcher: Arc::new(matcher),
        })
    }

    /// Creates the schema, then supervises the units until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<SupervisorReport> {
        // Fail fast on an unusable database before any unit starts.
        Repository::new(&self.config.db_path).await?;

        let worker_count = self.config.worker_count;
        let restart_delay = self.config.restart_delay();
        let shutdown_grace = self.config.shutdown_grace();

        let report = Supervisor::new(Arc::new(self), worker_count)
            .with_restart_delay(restart_delay)
            .with_shutdown_grace(shutdown_grace)
            .run(shutdown)
            .await;
        Ok(report)
    }
}

impl Launcher for App {
    fn launch(&self, kind: UnitKind, cancel: CancellationToken) -> BoxFuture<'static, Result<()>> {
        let config = Arc::clone(&self.config);
        let matcher = Arc::clone(&self.matcher);

        Box::pin(async move {
            // Each unit owns its connection and client for as long as it runs.
            let store = Repository::new(&config.db_path).await?;
            let source = RedditClient::new(&config.source)?;
            let backoff = BackoffPolicy::new(config.max_backoff());

            match kind {
                UnitKind::Ingest { .. } => {
                    IngestWorker::new(
                        kind.to_string(),
                        source,
                        store,
                        matcher,
                        config.batch_size,
                        backoff,
                    )
                    .run(cancel)
                    .await
                }
                UnitKind::Update => {
                    UpdateWorker::new(source, store, backoff, config.update_idle())
                        .run(cancel)
                        .await
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn rejects_invalid_pattern() {
        let config = Config {
            match_pattern: "did (".to_string(),
            ..Config::default()
        };
        assert!(matches!(App::new(config), Err(AppError::Pattern(_))));
    }

    #[tokio::test]
    async fn unusable_database_fails_before_supervising() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir
                .path()
                .join("missing")
                .join("comments.db")
                .to_string_lossy()
                .to_string(),
            ..Config::default()
        };

        let result = App::new(config)
            .unwrap()
            .run(CancellationToken::new())
            .await;
        assert!(result.is_err());
    }
}
