//! Application context built once at startup and shared by every handler.

use std::sync::Arc;

use augur_core::config::{AugurConfig, StoreBackend};
use augur_core::predictor::{check_feature_count, load_predictor};
use augur_core::{
    AugurError, Domain, DomainKind, MemoryRecordSink, PgRecordSink, Predictor, RecordSink,
};

/// One hosted domain: its definition, its loaded model and the shared sink.
pub struct DomainState {
    pub kind: DomainKind,
    pub domain: &'static dyn Domain,
    pub predictor: Arc<dyn Predictor>,
    pub sink: Arc<dyn RecordSink>,
}

impl DomainState {
    pub fn new(kind: DomainKind, predictor: Arc<dyn Predictor>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            kind,
            domain: kind.domain(),
            predictor,
            sink,
        }
    }
}

pub struct AppContext {
    pub sink: Arc<dyn RecordSink>,
    pub domains: Vec<Arc<DomainState>>,
}

impl AppContext {
    pub fn new(sink: Arc<dyn RecordSink>, domains: Vec<Arc<DomainState>>) -> Self {
        Self { sink, domains }
    }

    /// Open the record store and load every enabled domain's model.
    ///
    /// Fails on an unknown domain name, a missing or unreadable artifact, or a
    /// model whose input width disagrees with the domain's feature list.
    pub async fn from_config(config: &AugurConfig) -> Result<Self, AugurError> {
        let sink = open_sink(config).await?;

        let mut domains = Vec::new();
        for (name, domain_config) in config.enabled_domains() {
            let kind: DomainKind = name.parse().map_err(AugurError::Other)?;
            let predictor = load_predictor(&domain_config.model_path, &domain_config.input_name)?;
            check_feature_count(predictor.as_ref(), kind.domain().encoder().len())?;

            if let Some(pg) = &sink.pg {
                augur_core::db::ensure_table(pg.pool(), kind.domain().table()).await?;
            }

            tracing::info!(
                domain = name,
                model = %domain_config.model_path,
                backend = predictor.name(),
                "Domain enabled"
            );
            domains.push(Arc::new(DomainState::new(kind, predictor, Arc::clone(&sink.dyn_sink))));
        }

        if domains.is_empty() {
            tracing::warn!("No domains enabled; only /health and /version will be served");
        }

        Ok(Self::new(sink.dyn_sink, domains))
    }

    pub fn domain(&self, kind: DomainKind) -> Option<&Arc<DomainState>> {
        self.domains.iter().find(|d| d.kind == kind)
    }
}

struct OpenedSink {
    dyn_sink: Arc<dyn RecordSink>,
    pg: Option<Arc<PgRecordSink>>,
}

async fn open_sink(config: &AugurConfig) -> Result<OpenedSink, AugurError> {
    match config.store.backend {
        StoreBackend::Postgres => {
            let url = config.store.database_url()?;
            let pool = augur_core::db::create_pool(&url, config.store.max_connections).await?;
            let pg = Arc::new(PgRecordSink::new(pool));
            tracing::info!("Record store: postgres");
            Ok(OpenedSink {
                dyn_sink: pg.clone(),
                pg: Some(pg),
            })
        }
        StoreBackend::Memory => {
            tracing::info!("Record store: in-memory (records are lost on exit)");
            Ok(OpenedSink {
                dyn_sink: Arc::new(MemoryRecordSink::new()),
                pg: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_model(dir: &std::path::Path, name: &str, width: usize) -> String {
        let coefficients = vec!["0.5"; width].join(", ");
        let path = dir.join(name);
        std::fs::write(
            &path,
            format!(r#"{{"kind": "regression", "coefficients": [{coefficients}], "intercept": 1.0}}"#),
        )
        .unwrap();
        path.to_string_lossy().to_string()
    }

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("augur-context-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_from_config_memory_store() {
        let dir = temp_dir();
        let model = write_model(&dir, "insurance.json", 6);
        let config = AugurConfig::from_toml(&format!(
            r#"
            [store]
            backend = "memory"

            [domains.insurance]
            model_path = "{model}"
            "#
        ))
        .unwrap();

        let ctx = AppContext::from_config(&config).await.unwrap();
        assert_eq!(ctx.sink.name(), "memory");
        assert_eq!(ctx.domains.len(), 1);
        assert!(ctx.domain(DomainKind::Insurance).is_some());
        assert!(ctx.domain(DomainKind::Loan).is_none());
    }

    #[tokio::test]
    async fn test_from_config_rejects_feature_mismatch() {
        let dir = temp_dir();
        let model = write_model(&dir, "insurance-wide.json", 9);
        let config = AugurConfig::from_toml(&format!(
            r#"
            [store]
            backend = "memory"

            [domains.insurance]
            model_path = "{model}"
            "#
        ))
        .unwrap();

        match AppContext::from_config(&config).await {
            Err(AugurError::Model(e)) => assert!(e.to_string().contains("9"), "{e}"),
            Err(other) => panic!("Expected a model error, got {other}"),
            Ok(_) => panic!("Expected a model error, got a context"),
        }
    }

    #[tokio::test]
    async fn test_from_config_rejects_unknown_domain() {
        let config = AugurConfig::from_toml(
            r#"
            [store]
            backend = "memory"

            [domains.weather]
            model_path = "/tmp/whatever.json"
            "#,
        )
        .unwrap();
        assert!(matches!(
            AppContext::from_config(&config).await,
            Err(AugurError::Other(_))
        ));
    }
}
