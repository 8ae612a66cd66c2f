//! Image-update reconciliation
//!
//! Flux resolves the newest image for every ImagePolicy Kollie creates.
//! This loop watches those policies and copies the resolved tag into the
//! `image_tag` substitution of the owning Kustomization.
//!
//! ```text
//! watcher task ──ImagePolicyEvent──► mpsc ──► ImageUpdater::run (sequential)
//!                                                │
//!                                                ├─ target_from_object   (pure)
//!                                                ├─ latest_image_tag     (pure)
//!                                                └─ AppUpdater::apply_update
//! ```
//!
//! Events are handled one at a time in arrival order. A failed event is
//! logged and dropped; only cancellation or a closed channel stops the loop.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DynamicObject};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use kollie_cluster::image_policy::ImagePolicy;
use kollie_cluster::kustomization::AppAttribute;
use kollie_common::{Result, LABEL_APP_NAME, LABEL_ENVIRONMENT};
use kollie_service::Orchestrator;

/// Capacity of the channel between the watcher and the updater
pub const EVENT_BUFFER: usize = 64;

/// A watch event for one ImagePolicy
#[derive(Clone, Debug)]
pub enum ImagePolicyEvent {
    /// Created or modified, including the initial listing
    Applied(DynamicObject),
    /// Deleted
    Deleted(DynamicObject),
}

impl ImagePolicyEvent {
    /// The policy the event is about
    pub fn object(&self) -> &DynamicObject {
        match self {
            Self::Applied(object) | Self::Deleted(object) => object,
        }
    }

    /// Value of a label on the policy, empty when absent
    fn label(&self, key: &str) -> &str {
        self.object()
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::Deleted(_) => "deleted",
        }
    }
}

/// Why an event did not lead to an update
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SkipReason {
    /// The policy lacks an environment or app label
    #[error("image policy has no {0} label")]
    MissingLabel(&'static str),

    /// No ImagePolicy exists for the app any more
    #[error("no image policy found for app")]
    NoImagePolicy,

    /// Flux has not resolved an image for the policy yet
    #[error("image policy {0} has no latest image")]
    NoLatestImage(String),

    /// The resolved image has no usable tag
    #[error("latest image {0} has no tag")]
    InvalidImageReference(String),
}

/// The app an ImagePolicy event points at
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePolicyTarget {
    /// Value of the environment label
    pub env_name: String,
    /// Value of the app label
    pub app_name: String,
}

/// Set an app's image tag
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppUpdateCommand {
    /// Environment the app lives in
    pub env_name: String,
    /// App to update
    pub app_name: String,
    /// Tag to deploy
    pub image_tag: String,
}

impl AppUpdateCommand {
    /// Patch attributes carried by this command
    pub fn attributes(&self) -> Vec<AppAttribute> {
        vec![AppAttribute::ImageTag(self.image_tag.clone())]
    }
}

/// What handling one event amounted to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// The app's image tag was patched
    Updated(AppUpdateCommand),
    /// Nothing was written
    Skipped(SkipReason),
}

/// Read the environment and app labels of a policy
pub fn target_from_object(metadata: &ObjectMeta) -> std::result::Result<ImagePolicyTarget, SkipReason> {
    let label = |key: &'static str| {
        metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .cloned()
            .ok_or(SkipReason::MissingLabel(key))
    };

    Ok(ImagePolicyTarget {
        env_name: label(LABEL_ENVIRONMENT)?,
        app_name: label(LABEL_APP_NAME)?,
    })
}

/// Tag of the latest image resolved by the first policy
pub fn latest_image_tag(policies: &[ImagePolicy]) -> std::result::Result<String, SkipReason> {
    let policy = policies.first().ok_or(SkipReason::NoImagePolicy)?;
    let image = policy.latest_image().ok_or_else(|| {
        SkipReason::NoLatestImage(policy.metadata.name.clone().unwrap_or_default())
    })?;

    split_image_tag(image)
        .map(str::to_string)
        .ok_or_else(|| SkipReason::InvalidImageReference(image.to_string()))
}

/// `registry:5000/app:tag` → `tag`
///
/// The tag follows the last colon. A colon inside the registry host is
/// followed by a path, so anything containing `/` after the colon is not a
/// tag.
fn split_image_tag(image: &str) -> Option<&str> {
    let (_, tag) = image.rsplit_once(':')?;
    (!tag.is_empty() && !tag.contains('/')).then_some(tag)
}

/// Reads and writes the updater needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AppUpdater: Send + Sync {
    /// ImagePolicies of an app
    async fn image_policies(&self, env_name: &str, app_name: &str) -> Result<Vec<ImagePolicy>>;

    /// Apply an update command
    async fn apply_update(&self, command: &AppUpdateCommand) -> Result<()>;
}

#[async_trait]
impl AppUpdater for Orchestrator {
    async fn image_policies(&self, env_name: &str, app_name: &str) -> Result<Vec<ImagePolicy>> {
        self.list_image_policies(env_name, app_name).await
    }

    async fn apply_update(&self, command: &AppUpdateCommand) -> Result<()> {
        self.update_app(&command.env_name, &command.app_name, &command.attributes())
            .await
    }
}

/// Sequential consumer of ImagePolicy events
pub struct ImageUpdater {
    apps: Arc<dyn AppUpdater>,
}

impl ImageUpdater {
    /// Updater applying commands through `apps`
    pub fn new(apps: Arc<dyn AppUpdater>) -> Self {
        Self { apps }
    }

    /// Handle one event
    ///
    /// Skips are logged here and reported as [`EventOutcome::Skipped`];
    /// errors from the cluster are returned.
    #[instrument(skip(self, event), fields(policy = %event.object().metadata.name.as_deref().unwrap_or_default(), event = event.kind()))]
    pub async fn handle_event(&self, event: &ImagePolicyEvent) -> Result<EventOutcome> {
        let outcome = match self.plan(event).await? {
            Ok(command) => {
                self.apps.apply_update(&command).await?;
                info!(
                    env_name = %command.env_name,
                    app_name = %command.app_name,
                    image_tag = %command.image_tag,
                    "image tag updated"
                );
                EventOutcome::Updated(command)
            }
            Err(reason) => {
                warn!(reason = %reason, "skipping image policy event");
                EventOutcome::Skipped(reason)
            }
        };
        Ok(outcome)
    }

    async fn plan(
        &self,
        event: &ImagePolicyEvent,
    ) -> Result<std::result::Result<AppUpdateCommand, SkipReason>> {
        let target = match target_from_object(&event.object().metadata) {
            Ok(target) => target,
            Err(reason) => return Ok(Err(reason)),
        };

        let policies = self
            .apps
            .image_policies(&target.env_name, &target.app_name)
            .await?;

        Ok(latest_image_tag(&policies).map(|image_tag| AppUpdateCommand {
            env_name: target.env_name,
            app_name: target.app_name,
            image_tag,
        }))
    }

    /// Consume events until cancelled or the sender goes away
    ///
    /// Cancellation is checked between events; an event already being
    /// handled runs to completion.
    pub async fn run(&self, mut events: mpsc::Receiver<ImagePolicyEvent>, token: CancellationToken) {
        info!("image updater started");

        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("graceful shutdown initiated");
                    break;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                debug!("event channel closed, stopping image updater");
                break;
            };

            if let Err(e) = self.handle_event(&event).await {
                let metadata = &event.object().metadata;
                error!(
                    error = %e,
                    policy = %metadata.name.as_deref().unwrap_or_default(),
                    namespace = %metadata.namespace.as_deref().unwrap_or_default(),
                    env_name = %event.label(LABEL_ENVIRONMENT),
                    app_name = %event.label(LABEL_APP_NAME),
                    event = event.kind(),
                    "failed to handle image policy event"
                );
            }
        }

        info!("image updater stopped");
    }
}

/// Watch ImagePolicies and forward their events
///
/// Watch errors are retried with backoff. The task ends when cancelled or
/// when the receiving side is dropped.
pub fn spawn_watcher(
    api: Api<DynamicObject>,
    events: mpsc::Sender<ImagePolicyEvent>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("starting image policy watcher");
        let mut stream = watcher::watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = stream.next() => next,
            };

            let event = match next {
                Some(Ok(Event::Apply(object))) | Some(Ok(Event::InitApply(object))) => {
                    ImagePolicyEvent::Applied(object)
                }
                Some(Ok(Event::Delete(object))) => ImagePolicyEvent::Deleted(object),
                Some(Ok(Event::Init)) | Some(Ok(Event::InitDone)) => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "image policy watch error");
                    continue;
                }
                None => break,
            };

            if events.send(event).await.is_err() {
                debug!("event channel closed, stopping image policy watcher");
                break;
            }
        }

        info!("image policy watcher stopped");
    })
}

/// Run the watcher and updater until `token` is cancelled
pub async fn reconcile(orchestrator: Arc<Orchestrator>, api: Api<DynamicObject>, token: CancellationToken) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let watcher = spawn_watcher(api, tx, token.clone());

    ImageUpdater::new(orchestrator).run(rx, token.clone()).await;

    // The updater also stops when the watcher's stream ends
    token.cancel();
    if let Err(e) = watcher.await {
        error!(error = %e, "image policy watcher panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;
    use std::sync::Mutex;

    use kollie_cluster::image_policy::{CreateImagePolicyRequest, ImagePolicyStatus};
    use kollie_cluster::{AppTemplate, ClusterConfig, ImageRepositoryRef};
    use kollie_common::kube_utils::HasApiResource;
    use kollie_common::Error;

    fn event(labels: &[(&str, &str)]) -> ImagePolicyEvent {
        let mut object = DynamicObject::new("feature-foo-pricing-service", &ImagePolicy::api_resource())
            .within("kollie");
        object.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
        ImagePolicyEvent::Applied(object)
    }

    fn labelled(env_name: &str, app_name: &str) -> ImagePolicyEvent {
        event(&[(LABEL_ENVIRONMENT, env_name), (LABEL_APP_NAME, app_name)])
    }

    fn policy(latest_image: Option<&str>) -> ImagePolicy {
        let template = AppTemplate {
            app_name: "pricing-service".to_string(),
            label: "Pricing Service".to_string(),
            git_repository_name: "k8s-apps".to_string(),
            git_repository_path: "./apps/pricing-service/testing".to_string(),
            default_image_tag_prefix: "main".to_string(),
            image_repository_ref: ImageRepositoryRef {
                name: "pricing-service".to_string(),
                namespace: "flux-system".to_string(),
            },
        };
        let mut policy = CreateImagePolicyRequest {
            env_name: "feature-foo",
            app_template: &template,
            image_tag_prefix: "main",
            owner_uid: "k-uid",
        }
        .body(&ClusterConfig::default());
        policy.status = latest_image.map(|image| ImagePolicyStatus {
            latest_image: Some(image.to_string()),
        });
        policy
    }

    fn updater(mock: MockAppUpdater) -> ImageUpdater {
        ImageUpdater::new(Arc::new(mock))
    }

    /// Formatted log output shared with a test subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn subscriber(&self, level: tracing::Level) -> impl tracing::Subscriber + Send + Sync {
            tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_ansi(false)
                .with_max_level(level)
                .finish()
        }

        fn lines_at(&self, level: &str) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .filter(|line| line.contains(level))
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn tag_follows_last_colon() {
        assert_eq!(
            split_image_tag("registry.tails.dev/pricing-service:main-abc123-1722241800"),
            Some("main-abc123-1722241800")
        );
        assert_eq!(
            split_image_tag("registry.tails.dev:5000/pricing-service:v1"),
            Some("v1")
        );
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        assert_eq!(split_image_tag("registry.tails.dev:5000/pricing-service"), None);
        assert_eq!(split_image_tag("pricing-service"), None);
        assert_eq!(split_image_tag("pricing-service:"), None);
    }

    #[test]
    fn missing_app_label_is_reported_by_name() {
        let event = event(&[(LABEL_ENVIRONMENT, "feature-foo")]);
        assert_eq!(
            target_from_object(&event.object().metadata),
            Err(SkipReason::MissingLabel(LABEL_APP_NAME))
        );
    }

    #[test]
    fn first_policy_decides_the_tag() {
        let policies = vec![
            policy(Some("registry.tails.dev/pricing-service:main-abc123-2")),
            policy(Some("registry.tails.dev/pricing-service:main-def456-1")),
        ];
        assert_eq!(latest_image_tag(&policies).unwrap(), "main-abc123-2");
    }

    #[test]
    fn unresolved_policy_has_no_tag() {
        assert_eq!(latest_image_tag(&[]), Err(SkipReason::NoImagePolicy));
        assert!(matches!(
            latest_image_tag(&[policy(None)]),
            Err(SkipReason::NoLatestImage(_))
        ));
        assert_eq!(
            latest_image_tag(&[policy(Some("pricing-service"))]),
            Err(SkipReason::InvalidImageReference("pricing-service".to_string()))
        );
    }

    #[tokio::test]
    async fn story_unlabelled_policy_is_skipped_without_cluster_calls() {
        let mut mock = MockAppUpdater::new();
        mock.expect_image_policies().never();
        mock.expect_apply_update().never();

        let outcome = updater(mock)
            .handle_event(&event(&[(LABEL_ENVIRONMENT, "feature-foo")]))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EventOutcome::Skipped(SkipReason::MissingLabel(LABEL_APP_NAME))
        );
    }

    #[tokio::test]
    async fn story_unlabelled_policy_logs_one_warning() {
        let mut mock = MockAppUpdater::new();
        mock.expect_image_policies().never();
        mock.expect_apply_update().never();

        let logs = CapturedLogs::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber(tracing::Level::WARN));

        updater(mock)
            .handle_event(&event(&[(LABEL_ENVIRONMENT, "feature-foo")]))
            .await
            .unwrap();

        let warnings = logs.lines_at("WARN");
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("skipping image policy event"));
        assert!(warnings[0].contains(LABEL_APP_NAME));
    }

    #[tokio::test]
    async fn story_resolved_image_updates_app_tag() {
        let mut mock = MockAppUpdater::new();
        mock.expect_image_policies()
            .withf(|env, app| env == "feature-foo" && app == "pricing-service")
            .times(1)
            .returning(|_, _| {
                Ok(vec![policy(Some(
                    "registry.tails.dev/pricing-service:main-abc123-1722241800",
                ))])
            });
        mock.expect_apply_update()
            .withf(|command| {
                command.attributes()
                    == vec![AppAttribute::ImageTag("main-abc123-1722241800".to_string())]
            })
            .times(1)
            .returning(|_| Ok(()));

        let outcome = updater(mock)
            .handle_event(&labelled("feature-foo", "pricing-service"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EventOutcome::Updated(AppUpdateCommand {
                env_name: "feature-foo".to_string(),
                app_name: "pricing-service".to_string(),
                image_tag: "main-abc123-1722241800".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn story_deleted_policy_is_skipped() {
        let mut mock = MockAppUpdater::new();
        mock.expect_image_policies().returning(|_, _| Ok(vec![]));
        mock.expect_apply_update().never();

        let outcome = updater(mock)
            .handle_event(&labelled("feature-foo", "pricing-service"))
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::Skipped(SkipReason::NoImagePolicy));
    }

    #[tokio::test]
    async fn story_failed_event_does_not_stop_the_loop() {
        let mut mock = MockAppUpdater::new();
        mock.expect_image_policies().returning(|_, _| {
            Ok(vec![policy(Some("registry.tails.dev/pricing-service:main-abc123-1"))])
        });
        mock.expect_apply_update()
            .withf(|command| command.env_name == "broken")
            .times(1)
            .returning(|command| Err(Error::app_not_found(&command.env_name, &command.app_name)));
        mock.expect_apply_update()
            .withf(|command| command.env_name == "feature-foo")
            .times(1)
            .returning(|_| Ok(()));

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tx.send(labelled("broken", "pricing-service")).await.unwrap();
        tx.send(event(&[])).await.unwrap();
        tx.send(labelled("feature-foo", "pricing-service")).await.unwrap();
        drop(tx);

        updater(mock).run(rx, CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn story_failed_event_is_logged_with_its_labels() {
        let mut mock = MockAppUpdater::new();
        mock.expect_image_policies().returning(|_, _| {
            Ok(vec![policy(Some("registry.tails.dev/pricing-service:main-abc123-1"))])
        });
        mock.expect_apply_update()
            .times(1)
            .returning(|command| Err(Error::app_not_found(&command.env_name, &command.app_name)));

        let logs = CapturedLogs::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber(tracing::Level::ERROR));

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tx.send(labelled("broken", "pricing-service")).await.unwrap();
        drop(tx);
        updater(mock).run(rx, CancellationToken::new()).await;

        let errors = logs.lines_at("ERROR");
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("failed to handle image policy event"));
        assert!(errors[0].contains("namespace=kollie"));
        assert!(errors[0].contains("env_name=broken"));
        assert!(errors[0].contains("app_name=pricing-service"));
    }

    #[tokio::test]
    async fn story_cancelled_loop_handles_nothing_further() {
        let mut mock = MockAppUpdater::new();
        mock.expect_image_policies().never();
        mock.expect_apply_update().never();

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tx.send(labelled("feature-foo", "pricing-service")).await.unwrap();

        let token = CancellationToken::new();
        token.cancel();

        updater(mock).run(rx, token).await;
    }
}
