use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::types::{steps_from_jobs, ApiAnnotation, ApiBuild, ApiMessage};
use crate::auth::Token;
use crate::config::BuildkiteConfig;
use crate::error::{InsightsError, Result};
use crate::fetch::{BuildPage, BuildQuery, BuildSource, PageCursor};
use crate::model::{Annotation, Build, StepExecution};

/// Buildkite REST API client.
///
/// Each call is one blocking round trip; failures are reported as
/// [`InsightsError::RemoteUnavailable`] and never retried here.
pub struct BuildkiteClient {
    client: Client,
    api_url: Url,
    organization: String,
    per_page: usize,
    token: Token,
}

impl BuildkiteClient {
    /// Creates a client for the configured organization.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &BuildkiteConfig, token: Token) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("bkinsights/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InsightsError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Url::join drops the last path segment unless it ends with a slash
        let mut base = config.api_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let api_url = Url::parse(&base)
            .map_err(|e| InsightsError::Config(format!("Invalid API URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            organization: config.organization.clone(),
            per_page: config.per_page.clamp(1, 100),
            token,
        })
    }

    fn builds_url(&self, pipeline: &str) -> Result<Url> {
        self.api_url
            .join(&format!(
                "organizations/{}/pipelines/{pipeline}/builds",
                self.organization
            ))
            .map_err(|e| InsightsError::Config(format!("Invalid builds URL: {e}")))
    }

    fn build_url(&self, pipeline: &str, number: u64, suffix: &str) -> Result<Url> {
        self.api_url
            .join(&format!(
                "organizations/{}/pipelines/{pipeline}/builds/{number}{suffix}",
                self.organization
            ))
            .map_err(|e| InsightsError::Config(format!("Invalid build URL: {e}")))
    }

    /// Issues an authenticated GET and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> Result<(T, HeaderMap)> {
        debug!("GET {url} {params:?}");
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.as_str())
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Buildkite rate limit exceeded");
            return Err(InsightsError::remote(
                Some(status.as_u16()),
                "rate limit exceeded",
            ));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiMessage>(&body)
                .map(|m| m.message)
                .unwrap_or(body);
            return Err(InsightsError::remote(Some(status.as_u16()), message));
        }

        let headers = response.headers().clone();
        let body = response.json::<T>().await?;
        Ok((body, headers))
    }

    /// Pipeline slug of a build, taken from its web URL.
    fn pipeline_of(build: &Build) -> Result<&str> {
        let mut segments = build.web_url.trim_end_matches('/').rsplit('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(_number), Some("builds"), Some(pipeline)) => Ok(pipeline),
            _ => Err(InsightsError::Config(format!(
                "Cannot determine pipeline of build #{} from {}",
                build.number, build.web_url
            ))),
        }
    }
}

/// Whether a `Link` header announces a further page.
fn has_next_link(headers: &HeaderMap) -> Option<bool> {
    let link = headers.get(LINK)?.to_str().ok()?;
    Some(link.split(',').any(|part| part.contains("rel=\"next\"")))
}

impl BuildSource for BuildkiteClient {
    async fn list_builds(&self, query: &BuildQuery, cursor: PageCursor) -> Result<BuildPage> {
        let mut params = vec![
            ("page", cursor.page().to_string()),
            ("per_page", self.per_page.to_string()),
            ("include_retried_jobs", "true".to_string()),
        ];
        if let Some(branch) = &query.branch {
            params.push(("branch", branch.clone()));
        }
        params.extend(
            query
                .states
                .iter()
                .map(|state| ("state[]", state.as_str().to_string())),
        );

        let url = self.builds_url(&query.pipeline)?;
        let (api_builds, headers): (Vec<ApiBuild>, _) = self.get_json(url, &params).await?;

        let fetched = api_builds.len();
        let has_more = fetched > 0 && has_next_link(&headers).unwrap_or(fetched >= self.per_page);
        let builds: Vec<Build> = api_builds
            .into_iter()
            .filter_map(ApiBuild::into_build)
            .collect();
        if builds.len() < fetched {
            debug!(
                "Page {}: dropped {} of {fetched} builds in unknown states",
                cursor.page(),
                fetched - builds.len()
            );
        }

        Ok(BuildPage { builds, has_more })
    }

    async fn list_steps(&self, build: &Build) -> Result<Vec<StepExecution>> {
        let url = self.build_url(Self::pipeline_of(build)?, build.number, "")?;
        let params = [("include_retried_jobs", "true".to_string())];
        let (api_build, _): (ApiBuild, _) = self.get_json(url, &params).await?;
        Ok(steps_from_jobs(api_build.jobs.unwrap_or_default()))
    }

    async fn list_annotations(&self, build: &Build) -> Result<Vec<Annotation>> {
        let url = self.build_url(Self::pipeline_of(build)?, build.number, "/annotations")?;
        let (annotations, _): (Vec<ApiAnnotation>, _) = self.get_json(url, &[]).await?;
        Ok(annotations.into_iter().map(Annotation::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchController, FetchOutcome, FetchPolicy, PageConsumer};
    use crate::model::BuildState;
    use mockito::Matcher;

    const BUILDS_PATH: &str = "/organizations/materialize/pipelines/test/builds";

    fn client(server: &mockito::ServerGuard) -> BuildkiteClient {
        let config = BuildkiteConfig {
            api_url: server.url(),
            per_page: 2,
            ..BuildkiteConfig::default()
        };
        BuildkiteClient::new(&config, Token::from("bkua_test")).unwrap()
    }

    fn query() -> BuildQuery {
        BuildQuery {
            pipeline: "test".to_string(),
            branch: Some("main".to_string()),
            states: vec![BuildState::Failed],
        }
    }

    fn build_json(number: u64) -> String {
        format!(
            r#"{{"number": {number}, "state": "failed", "branch": "main",
                "web_url": "https://buildkite.com/materialize/test/builds/{number}",
                "created_at": "2024-03-01T10:00:00Z", "finished_at": null,
                "jobs": [{{"id": "j{number}", "type": "script", "step_key": "cargo-test",
                           "state": "passed", "started_at": "2024-03-01T10:00:00Z",
                           "finished_at": "2024-03-01T10:02:00Z"}}]}}"#
        )
    }

    #[tokio::test]
    async fn list_builds_passes_filters_and_reads_link_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", BUILDS_PATH)
            .match_header("authorization", "Bearer bkua_test")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "3".into()),
                Matcher::UrlEncoded("per_page".into(), "2".into()),
                Matcher::UrlEncoded("branch".into(), "main".into()),
                Matcher::UrlEncoded("state[]".into(), "failed".into()),
                Matcher::UrlEncoded("include_retried_jobs".into(), "true".into()),
            ]))
            .with_status(200)
            .with_header(
                "link",
                r#"<https://api.buildkite.com/v2/x?page=4>; rel="next", <https://api.buildkite.com/v2/x?page=9>; rel="last""#,
            )
            .with_body(format!("[{}, {}]", build_json(12), build_json(11)))
            .create_async()
            .await;

        let page = client(&server)
            .list_builds(&query(), PageCursor::starting_at(3))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(page.has_more);
        let numbers: Vec<u64> = page.builds.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![12, 11]);
        assert_eq!(page.builds[0].steps().len(), 1);
    }

    #[tokio::test]
    async fn last_page_has_no_next_link() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", BUILDS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("link", r#"<https://api.buildkite.com/v2/x?page=1>; rel="first""#)
            .with_body(format!("[{}, {}]", build_json(2), build_json(1)))
            .create_async()
            .await;

        let page = client(&server)
            .list_builds(&query(), PageCursor::default())
            .await
            .unwrap();

        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn without_link_header_a_short_page_is_the_last() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", BUILDS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!("[{}]", build_json(1)))
            .create_async()
            .await;

        let page = client(&server)
            .list_builds(&query(), PageCursor::default())
            .await
            .unwrap();

        assert!(!page.has_more);
        assert_eq!(page.builds.len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_is_remote_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", BUILDS_PATH)
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let err = client(&server)
            .list_builds(&query(), PageCursor::default())
            .await
            .unwrap_err();

        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn api_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", BUILDS_PATH)
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"message": "Authentication required"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .list_builds(&query(), PageCursor::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InsightsError::RemoteUnavailable { status: Some(401), ref message } if message == "Authentication required"
        ));
    }

    #[derive(Default)]
    struct BuildNumbers(Vec<u64>);

    impl PageConsumer for BuildNumbers {
        async fn consume(&mut self, builds: Vec<Build>) -> Result<()> {
            self.0.extend(builds.iter().map(|b| b.number));
            Ok(())
        }

        fn is_satisfied(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn page_of_unknown_states_does_not_end_pagination() {
        let mut server = mockito::Server::new_async().await;
        let _first = server
            .mock("GET", BUILDS_PATH)
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_header("link", r#"<https://api.buildkite.com/v2/x?page=2>; rel="next""#)
            .with_body(
                r#"[{"number": 3, "state": "creating", "branch": "main",
                     "web_url": "https://buildkite.com/materialize/test/builds/3",
                     "created_at": "2024-03-01T10:00:00Z", "finished_at": null}]"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", BUILDS_PATH)
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(format!("[{}]", build_json(2)))
            .create_async()
            .await;

        let client = client(&server);
        let mut controller = FetchController::new(&client, query(), FetchPolicy::Auto, 5);
        let mut consumer = BuildNumbers::default();
        let summary = controller.run(&mut consumer).await.unwrap();

        second.assert_async().await;
        assert_eq!(summary.outcome, FetchOutcome::Exhausted);
        assert_eq!(summary.pages_fetched, 2);
        assert_eq!(consumer.0, vec![2]);
    }

    #[tokio::test]
    async fn list_annotations_uses_build_pipeline() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/organizations/materialize/pipelines/nightly/builds/42/annotations")
            .with_status(200)
            .with_body(
                r#"[{"id": "a1", "context": "test-failures", "style": "error",
                     "body_html": "<p>panicked</p>", "created_at": "2024-03-01T10:00:00Z"}]"#,
            )
            .create_async()
            .await;

        let build = Build {
            number: 42,
            web_url: "https://buildkite.com/materialize/nightly/builds/42".to_string(),
            branch: "main".to_string(),
            state: BuildState::Failed,
            created_at: chrono::Utc::now(),
            finished_at: None,
            steps: None,
            annotations: None,
        };
        let annotations = client(&server).list_annotations(&build).await.unwrap();

        mock.assert_async().await;
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].body, "<p>panicked</p>");
    }

    #[tokio::test]
    async fn list_steps_reads_single_build() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/organizations/materialize/pipelines/test/builds/7")
            .match_query(Matcher::UrlEncoded("include_retried_jobs".into(), "true".into()))
            .with_status(200)
            .with_body(build_json(7))
            .create_async()
            .await;

        let mut build = Build {
            number: 7,
            web_url: "https://buildkite.com/materialize/test/builds/7".to_string(),
            branch: "main".to_string(),
            state: BuildState::Failed,
            created_at: chrono::Utc::now(),
            finished_at: None,
            steps: None,
            annotations: None,
        };
        build.steps = Some(client(&server).list_steps(&build).await.unwrap());

        assert_eq!(build.steps().len(), 1);
        assert_eq!(build.steps()[0].duration_secs(), Some(120.0));
    }
}
