//! Agent setup flow
//!
//! Probe the gateway with the candidate token, encrypt the token with the
//! device vault, then store the agent record for the signed-in user.
//! Every failure is reported as a single [`SetupFailure`] naming the stage it
//! happened in, so the caller can show it next to the form and let the user
//! try again.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ProbeConfig;
use crate::directory::{AgentDirectory, IdentityProvider, NewAgentRecord};
use crate::error::Error;
use crate::gateway::{probe, url::parse_gateway_url};
use crate::vault::TokenVault;

/// Name prefilled in the setup form
pub const DEFAULT_AGENT_NAME: &str = "Lumi Local";

/// Gateway URL prefilled in the setup form
pub const DEFAULT_GATEWAY_URL: &str = "ws://localhost:18789";

/// User input for a new agent
#[derive(Debug, Clone)]
pub struct SetupForm {
    pub name: String,
    pub gateway_url: String,
    pub token: SecretString,
}

impl SetupForm {
    /// Form with the default name and URL
    pub fn new(token: SecretString) -> Self {
        SetupForm {
            name: DEFAULT_AGENT_NAME.to_string(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            token,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }
}

/// Progress of a setup run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// Probing the gateway
    Testing,
    /// Encrypting the token
    Encrypting,
    /// Writing the agent record
    Saving,
    /// Record stored
    Success,
}

impl SetupStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStage::Testing => "testing",
            SetupStage::Encrypting => "encrypting",
            SetupStage::Saving => "saving",
            SetupStage::Success => "success",
        }
    }
}

impl std::fmt::Display for SetupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A setup run that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SetupFailure {
    /// Stage that failed
    pub stage: SetupStage,
    /// One human-readable message
    pub message: String,
}

impl SetupFailure {
    fn new(stage: SetupStage, message: impl Into<String>) -> Self {
        SetupFailure {
            stage,
            message: message.into(),
        }
    }

    fn from_error(stage: SetupStage, err: Error) -> Self {
        let message = match err {
            Error::HandshakeTimeout(message) | Error::HandshakeRefused(message) => message,
            other => other.to_string(),
        };
        Self::new(stage, message)
    }
}

/// Runs the probe -> encrypt -> save sequence
#[derive(Clone)]
pub struct AgentSetup {
    vault: Arc<TokenVault>,
    directory: Arc<dyn AgentDirectory>,
    identity: Arc<dyn IdentityProvider>,
    probe: ProbeConfig,
}

impl AgentSetup {
    pub fn new(
        vault: Arc<TokenVault>,
        directory: Arc<dyn AgentDirectory>,
        identity: Arc<dyn IdentityProvider>,
        probe: ProbeConfig,
    ) -> Self {
        AgentSetup {
            vault,
            directory,
            identity,
            probe,
        }
    }

    /// Run setup, reporting each stage to `on_stage` as it starts.
    /// Returns the id of the stored record.
    pub async fn run(
        &self,
        form: SetupForm,
        mut on_stage: impl FnMut(SetupStage),
    ) -> std::result::Result<Uuid, SetupFailure> {
        let result = self.run_stages(form, &mut on_stage).await;
        if let Err(ref failure) = result {
            warn!("Agent setup failed while {}: {}", failure.stage, failure.message);
        }
        result
    }

    async fn run_stages(
        &self,
        form: SetupForm,
        on_stage: &mut impl FnMut(SetupStage),
    ) -> std::result::Result<Uuid, SetupFailure> {
        use SetupStage::*;

        on_stage(Testing);
        let name = form.name.trim();
        if name.is_empty() {
            return Err(SetupFailure::new(Testing, "Agent name is required."));
        }
        if form.token.expose_secret().is_empty() {
            return Err(SetupFailure::new(Testing, "Gateway token is required."));
        }
        let gateway_url = form.gateway_url.trim();
        parse_gateway_url(gateway_url).map_err(|e| SetupFailure::from_error(Testing, e))?;
        probe(gateway_url, &form.token, &self.probe)
            .await
            .map_err(|e| SetupFailure::from_error(Testing, e))?;

        on_stage(Encrypting);
        let encrypted = self
            .vault
            .encrypt_token(&form.token)
            .await
            .map_err(|e| SetupFailure::from_error(Encrypting, e))?;

        on_stage(Saving);
        let owner_id = self
            .identity
            .current_user()
            .await
            .map_err(|e| SetupFailure::from_error(Saving, e))?
            .ok_or_else(|| SetupFailure::new(Saving, "Not authenticated"))?;

        let id = self
            .directory
            .insert(NewAgentRecord {
                owner_id,
                name: name.to_string(),
                gateway_url: gateway_url.to_string(),
                gateway_token_encrypted: encrypted,
                is_active: true,
            })
            .await
            .map_err(|e| SetupFailure::from_error(Saving, e))?;

        on_stage(Success);
        info!("Agent {} configured ({})", name, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{JsonFileDirectory, StaticIdentity};
    use crate::gateway::probe::REFUSED_MESSAGE;
    use futures::StreamExt;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio::net::TcpListener;

    /// Gateway that accepts every socket and ignores what it receives
    async fn accepting_gateway() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                });
            }
        });
        format!("ws://{}", addr)
    }

    struct Fixture {
        _dir: TempDir,
        vault: Arc<TokenVault>,
        directory: Arc<JsonFileDirectory>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let directory = Arc::new(JsonFileDirectory::new(dir.path().join("agents.json")));
            Fixture {
                _dir: dir,
                vault: Arc::new(TokenVault::ephemeral()),
                directory,
            }
        }

        fn setup(&self, identity: StaticIdentity) -> AgentSetup {
            AgentSetup::new(
                self.vault.clone(),
                self.directory.clone(),
                Arc::new(identity),
                ProbeConfig {
                    timeout: Duration::from_secs(5),
                    ..ProbeConfig::default()
                },
            )
        }
    }

    fn form(url: &str) -> SetupForm {
        SetupForm::new(SecretString::from("gw-secret".to_string())).with_gateway_url(url)
    }

    #[test]
    fn test_form_defaults() {
        let form = SetupForm::new(SecretString::from("t".to_string()));
        assert_eq!(form.name, "Lumi Local");
        assert_eq!(form.gateway_url, "ws://localhost:18789");
    }

    #[tokio::test]
    async fn test_setup_success_stores_encrypted_token() {
        let fixture = Fixture::new();
        let url = accepting_gateway().await;
        let mut stages = Vec::new();

        let id = fixture
            .setup(StaticIdentity::signed_in("user-1"))
            .run(form(&url), |stage| stages.push(stage))
            .await
            .unwrap();

        assert_eq!(
            stages,
            [
                SetupStage::Testing,
                SetupStage::Encrypting,
                SetupStage::Saving,
                SetupStage::Success
            ]
        );

        let record = fixture.directory.get("user-1").await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.name, "Lumi Local");
        assert_eq!(record.gateway_url, url);
        assert!(record.is_active);
        assert!(!record.gateway_token_encrypted.contains("gw-secret"));

        let token = fixture
            .vault
            .decrypt_token(&record.gateway_token_encrypted)
            .await
            .unwrap();
        assert_eq!(token.expose_secret(), "gw-secret");
    }

    #[tokio::test]
    async fn test_refused_probe_is_reported_at_testing() {
        let fixture = Fixture::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let failure = fixture
            .setup(StaticIdentity::signed_in("user-1"))
            .run(form(&format!("ws://{}", addr)), |_| {})
            .await
            .unwrap_err();

        assert_eq!(failure.stage, SetupStage::Testing);
        assert_eq!(failure.message, REFUSED_MESSAGE);
        assert!(fixture.directory.get("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_not_authenticated() {
        let fixture = Fixture::new();
        let url = accepting_gateway().await;

        let failure = fixture
            .setup(StaticIdentity::anonymous())
            .run(form(&url), |_| {})
            .await
            .unwrap_err();

        assert_eq!(failure.stage, SetupStage::Saving);
        assert_eq!(failure.to_string(), "Not authenticated");
    }

    #[tokio::test]
    async fn test_rejects_bad_input_before_probing() {
        let fixture = Fixture::new();
        let setup = fixture.setup(StaticIdentity::signed_in("user-1"));

        let failure = setup.run(form("http://localhost:18789"), |_| {}).await.unwrap_err();
        assert_eq!(failure.stage, SetupStage::Testing);
        assert!(failure.message.contains("ws://"));

        let failure = setup
            .run(SetupForm::new(SecretString::from(String::new())), |_| {})
            .await
            .unwrap_err();
        assert_eq!(failure.message, "Gateway token is required.");

        let failure = setup.run(form("ws://localhost:1").with_name("  "), |_| {}).await.unwrap_err();
        assert_eq!(failure.message, "Agent name is required.");
    }
}
