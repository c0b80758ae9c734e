//! # Moderation Service
//! The operations the command layer calls: analysis (remote call → extraction
//! → tenant thresholds → verdict) and threshold administration (write → audit).
//!
//! Holds its collaborators explicitly; there is no process-wide threshold state.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::analyze;
use crate::config::DEFAULT_UPSTREAM_TIMEOUT_SECS;
use crate::decision::{AdvancedAnalysis, Analysis, Scores};
use crate::engine;
use crate::error::ModerationError;
use crate::metrics;
use crate::moderation::{DynModerator, ModelSet};
use crate::storage::Storage;
use crate::thresholds::{
    parse_threshold_value, AuditLog, ResetTarget, ThresholdChange, ThresholdName, ThresholdStore,
    Thresholds,
};

/// Result of a successful threshold write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdUpdate {
    pub name: ThresholdName,
    /// Value stored for this scope before the write, if any.
    pub old_value: Option<f64>,
    pub new_value: f64,
    /// `false` when the write succeeded but the audit record could not be stored.
    pub audited: bool,
}

/// Per-name outcome of a reset.
#[derive(Debug, Default)]
pub struct ResetReport {
    pub updates: Vec<ThresholdUpdate>,
    pub failed: Vec<(ThresholdName, ModerationError)>,
}

impl ResetReport {
    pub fn reset_names(&self) -> Vec<ThresholdName> {
        self.updates.iter().map(|u| u.name).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct ModerationService {
    thresholds: ThresholdStore,
    audit: AuditLog,
    moderator: DynModerator,
    upstream_timeout: Duration,
    /// Serializes read-old → write → audit so concurrent changes record a
    /// consistent `old_value` chain.
    write_lock: Arc<Mutex<()>>,
}

impl ModerationService {
    pub fn new(thresholds: ThresholdStore, audit: AuditLog, moderator: DynModerator) -> Self {
        Self {
            thresholds,
            audit,
            moderator,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_storage(storage: &Storage, moderator: DynModerator) -> Self {
        Self::new(
            ThresholdStore::new(Arc::clone(&storage.thresholds)),
            AuditLog::new(storage.audit.clone()),
            moderator,
        )
    }

    /// Upper bound on one moderation call, on top of any client-side timeout.
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    // --- pure operations ---------------------------------------------------

    pub fn extract_scores(doc: &Value) -> Scores {
        analyze::extract_scores(doc)
    }

    pub fn extract_advanced(doc: &Value) -> AdvancedAnalysis {
        analyze::extract_advanced(doc)
    }

    pub fn compute_verdict(scores: &Scores, thresholds: &Thresholds) -> Analysis {
        engine::compute_verdict(scores, thresholds)
    }

    // --- analysis ----------------------------------------------------------

    pub fn resolve_thresholds(&self, tenant_id: &str) -> Result<Thresholds, ModerationError> {
        self.thresholds.resolve(tenant_id)
    }

    /// Full model set, tenant thresholds, verdict.
    pub async fn analyse_image(&self, tenant_id: &str, image_url: &str) -> Result<Analysis, ModerationError> {
        let doc = self.fetch(image_url, ModelSet::Full).await?;
        let thresholds = self.resolve_thresholds(tenant_id)?;
        let analysis = engine::analyse_document(&doc, &thresholds);
        metrics::record_analysis("standard", Some(analysis.allowed));
        info!(
            tenant = tenant_id,
            url_id = %url_id(image_url),
            allowed = analysis.allowed,
            reasons = ?analysis.reasons,
            "image analysed"
        );
        Ok(analysis)
    }

    /// Full model set, every numeric sub-score, no verdict.
    pub async fn analyse_image_advanced(&self, image_url: &str) -> Result<AdvancedAnalysis, ModerationError> {
        let doc = self.fetch(image_url, ModelSet::Full).await?;
        let aa = analyze::extract_advanced(&doc);
        metrics::record_analysis("advanced", None);
        info!(url_id = %url_id(image_url), categories = aa.categories.len(), "image analysed (advanced)");
        Ok(aa)
    }

    /// AI detection only; the other three scores read as 0.
    pub async fn check_ai(&self, tenant_id: &str, image_url: &str) -> Result<Analysis, ModerationError> {
        let doc = self.fetch(image_url, ModelSet::AiOnly).await?;
        let thresholds = self.resolve_thresholds(tenant_id)?;
        let analysis = engine::analyse_document(&doc, &thresholds);
        metrics::record_analysis("ai", Some(analysis.allowed));
        info!(
            tenant = tenant_id,
            url_id = %url_id(image_url),
            ai_generated = analysis.scores.ai_generated,
            allowed = analysis.allowed,
            "ai check"
        );
        Ok(analysis)
    }

    async fn fetch(&self, image_url: &str, models: ModelSet) -> Result<Value, ModerationError> {
        let image_url = image_url.trim();
        if image_url.is_empty() {
            return Err(ModerationError::UpstreamAnalysis("missing image URL".into()));
        }

        let call = self.moderator.check(image_url, models);
        let res = match tokio::time::timeout(self.upstream_timeout, call).await {
            Ok(res) => res,
            Err(_) => Err(ModerationError::UpstreamAnalysis(format!(
                "timed out after {}s",
                self.upstream_timeout.as_secs()
            ))),
        };
        if let Err(e) = &res {
            metrics::record_upstream_error();
            warn!(
                url_id = %url_id(image_url),
                provider = self.moderator.provider_name(),
                error = %e,
                "moderation call failed"
            );
        }
        res
    }

    // --- threshold administration -----------------------------------------

    /// Parse, validate, write, then audit. The empty tenant writes the global scope.
    pub fn set_threshold(
        &self,
        tenant_id: &str,
        actor_id: &str,
        name: &str,
        value_text: &str,
    ) -> Result<ThresholdUpdate, ModerationError> {
        let value = parse_threshold_value(value_text)?;
        let name: ThresholdName = name.parse()?;
        self.write_and_record(tenant_id, actor_id, name, value)
    }

    /// Reset one name or all four to the compiled defaults.
    ///
    /// Each name is attempted independently. Errors only when nothing was
    /// reset; partial failures are listed in the report.
    pub fn reset_threshold(
        &self,
        tenant_id: &str,
        actor_id: &str,
        target: ResetTarget,
    ) -> Result<ResetReport, ModerationError> {
        let outcome = self.thresholds.reset_with(tenant_id, target, |name| {
            self.write_and_record(tenant_id, actor_id, name, name.default_value())
        });
        let mut report = ResetReport {
            updates: outcome.reset,
            failed: outcome.failed,
        };

        if report.updates.is_empty() {
            if let Some((_, e)) = report.failed.pop() {
                return Err(e);
            }
        }
        Ok(report)
    }

    fn write_and_record(
        &self,
        tenant_id: &str,
        actor_id: &str,
        name: ThresholdName,
        value: f64,
    ) -> Result<ThresholdUpdate, ModerationError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let old_value = self.thresholds.explicit_value(tenant_id, name)?;
        self.thresholds.set_named(tenant_id, name, value)?;
        metrics::record_threshold_change(name);

        let audited = match self.record_change(name, old_value, value, actor_id, tenant_id) {
            Ok(rec) => rec.is_some(),
            Err(e) => {
                warn!(tenant = tenant_id, threshold = %name, error = %e, "audit record not stored");
                false
            }
        };
        info!(
            tenant = tenant_id,
            actor = actor_id,
            threshold = %name,
            old = ?old_value,
            new = value,
            audited,
            "threshold changed"
        );
        Ok(ThresholdUpdate {
            name,
            old_value,
            new_value: value,
            audited,
        })
    }

    /// Append one audit record. `Ok(None)` when no audit backend is configured.
    pub fn record_change(
        &self,
        name: ThresholdName,
        old_value: Option<f64>,
        new_value: f64,
        actor_id: &str,
        tenant_id: &str,
    ) -> Result<Option<ThresholdChange>, ModerationError> {
        self.audit
            .record(name, old_value, new_value, Some(actor_id), Some(tenant_id))
    }

    /// Newest first; empty without an audit backend.
    pub fn get_history(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
        name: Option<ThresholdName>,
    ) -> Result<Vec<ThresholdChange>, ModerationError> {
        let out = self.audit.history_for(tenant_id, limit, name)?;
        debug!(tenant = tenant_id, rows = out.len(), "threshold history");
        Ok(out)
    }
}

/// Short SHA-256 prefix of a URL, for logs.
pub(crate) fn url_id(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(url.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::ImageModerator;
    use crate::storage::SqliteStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct Canned(Value);

    #[async_trait]
    impl ImageModerator for Canned {
        async fn check(&self, _url: &str, models: ModelSet) -> Result<Value, ModerationError> {
            match models {
                ModelSet::Full => Ok(self.0.clone()),
                ModelSet::AiOnly => Ok(json!({"type": self.0.get("type").cloned().unwrap_or_default()})),
            }
        }
        fn provider_name(&self) -> &'static str {
            "canned"
        }
    }

    struct Slow;

    #[async_trait]
    impl ImageModerator for Slow {
        async fn check(&self, _url: &str, _m: ModelSet) -> Result<Value, ModerationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }
        fn provider_name(&self) -> &'static str {
            "slow"
        }
    }

    fn service_with(doc: Value) -> ModerationService {
        let storage = Storage::sqlite(SqliteStore::in_memory().unwrap());
        ModerationService::from_storage(&storage, Arc::new(Canned(doc)))
    }

    #[test]
    fn url_id_is_short_and_stable() {
        let a = url_id("https://x/y.png");
        assert_eq!(a.len(), 12);
        assert_eq!(a, url_id("https://x/y.png"));
        assert_ne!(a, url_id("https://x/z.png"));
    }

    #[tokio::test]
    async fn analysis_uses_tenant_thresholds() {
        let svc = service_with(json!({"type": {"ai_generated": 0.7}}));
        let a = svc.analyse_image("g1", "https://img").await.unwrap();
        assert!(!a.allowed);

        svc.set_threshold("g1", "u1", "AIGenerated", "80%").unwrap();
        assert!(svc.analyse_image("g1", "https://img").await.unwrap().allowed);
        // other tenants keep defaults
        assert!(!svc.analyse_image("g2", "https://img").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn ai_check_zeroes_other_scores() {
        let svc = service_with(json!({"nudity": {"erotica": 0.9}, "type": {"ai_generated": 0.1}}));
        let a = svc.check_ai("g1", "https://img").await.unwrap();
        assert!(a.allowed);
        assert_eq!(a.scores.nudity_explicit, 0.0);
        assert_eq!(a.scores.ai_generated, 0.1);
    }

    #[tokio::test]
    async fn empty_url_is_rejected_before_the_call() {
        let svc = service_with(json!({}));
        assert!(matches!(
            svc.analyse_image("g1", "  ").await,
            Err(ModerationError::UpstreamAnalysis(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_times_out() {
        let storage = Storage::in_memory();
        let svc = ModerationService::from_storage(&storage, Arc::new(Slow))
            .with_upstream_timeout(Duration::from_secs(1));
        match svc.analyse_image_advanced("https://img").await {
            Err(ModerationError::UpstreamAnalysis(m)) => assert!(m.contains("timed out")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn set_records_old_and_new_values() {
        let svc = service_with(json!({}));
        let first = svc.set_threshold("g1", "u1", "offensive", "0.5").unwrap();
        assert_eq!(first.old_value, None);
        assert!(first.audited);
        let second = svc.set_threshold("g1", "u1", "Offensive", "40%").unwrap();
        assert_eq!(second.old_value, Some(0.5));
        assert!((second.new_value - 0.4).abs() < 1e-12);

        let hist = svc.get_history("g1", None, None).unwrap();
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[0].old_value, Some(0.5));
        assert_eq!(hist[0].actor_id.as_deref(), Some("u1"));
    }

    #[test]
    fn invalid_input_writes_nothing() {
        let svc = service_with(json!({}));
        assert!(matches!(
            svc.set_threshold("g1", "u1", "Offensive", "abc"),
            Err(ModerationError::Parse { .. })
        ));
        assert!(matches!(
            svc.set_threshold("g1", "u1", "Offensive", "1.2"),
            Err(ModerationError::Range { .. })
        ));
        assert!(matches!(
            svc.set_threshold("g1", "u1", "Bogus", "0.5"),
            Err(ModerationError::UnknownThreshold { .. })
        ));
        assert!(svc.get_history("g1", None, None).unwrap().is_empty());
    }

    #[test]
    fn reset_all_audits_each_name() {
        let svc = service_with(json!({}));
        let report = svc.reset_threshold("g1", "u1", ResetTarget::All).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.reset_names(), ThresholdName::ALL.to_vec());
        assert_eq!(svc.get_history("g1", Some(100), None).unwrap().len(), 4);
    }

    #[test]
    fn empty_tenant_writes_global_scope() {
        let svc = service_with(json!({}));
        svc.set_threshold("", "owner", "Offensive", "0.9").unwrap();
        // global override applies to tenants without their own row
        assert_eq!(svc.resolve_thresholds("g9").unwrap().offensive, 0.9);
        // the empty tenant itself resolves defaults only
        assert_eq!(svc.resolve_thresholds("").unwrap(), Thresholds::default());

        let global = svc.get_history("", None, None).unwrap();
        assert_eq!(global.len(), 1);
        assert!(global[0].tenant_id.is_none());
        assert!(svc.get_history("g9", None, None).unwrap().is_empty());
    }

    #[test]
    fn memory_backend_has_no_history() {
        let storage = Storage::in_memory();
        let svc = ModerationService::from_storage(&storage, Arc::new(Canned(json!({}))));
        let u = svc.set_threshold("g1", "u1", "ai", "0.9").unwrap();
        assert!(!u.audited);
        assert_eq!(svc.resolve_thresholds("g1").unwrap().ai_generated, 0.9);
        assert!(svc.get_history("g1", None, None).unwrap().is_empty());
    }

    #[test]
    fn concurrent_sets_keep_a_consistent_history_chain() {
        let svc = service_with(json!({}));
        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let svc = svc.clone();
                std::thread::spawn(move || {
                    svc.set_threshold("g1", &format!("u{i}"), "Offensive", &format!("0.{i}"))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut hist = svc.get_history("g1", Some(100), None).unwrap();
        hist.reverse();
        assert_eq!(hist.len(), 8);
        assert_eq!(hist[0].old_value, None);
        for pair in hist.windows(2) {
            assert_eq!(pair[1].old_value, Some(pair[0].new_value));
        }
        let last = hist[7].new_value;
        assert_eq!(svc.resolve_thresholds("g1").unwrap().offensive, last);
    }
}
