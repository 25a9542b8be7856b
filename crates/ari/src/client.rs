//! ARI REST client
//!
//! Every operation maps to one REST call. Transport failures on idempotent
//! operations are retried once; everything surfaces as `SwitchIo`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use voice_gateway_config::AriConfig;
use voice_gateway_core::{CallControl, GatewayError, Result};

use crate::models::{Bridge, Channel, Playback, VariableValue};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// REST side of the ARI connection.
#[derive(Clone)]
pub struct AriClient {
    http: Client,
    config: AriConfig,
}

impl AriClient {
    pub fn new(config: AriConfig) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { http, config }
    }

    pub fn config(&self) -> &AriConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.config.url))
            .basic_auth(&self.config.username, Some(&self.config.password))
    }

    /// Send, retrying once on transport errors when the operation is
    /// idempotent. HTTP error statuses are never retried.
    async fn send(&self, builder: RequestBuilder, idempotent: bool) -> Result<reqwest::Response> {
        let retry = if idempotent {
            builder.try_clone()
        } else {
            None
        };

        match builder.send().await {
            Ok(response) => Ok(response),
            Err(first) => match retry {
                Some(second_attempt) => {
                    warn!(error = %first, "call-control request failed; retrying once");
                    second_attempt
                        .send()
                        .await
                        .map_err(|e| GatewayError::SwitchIo(e.to_string()))
                }
                None => Err(GatewayError::SwitchIo(first.to_string())),
            },
        }
    }

    async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(GatewayError::SwitchIo(format!(
                "{what}: HTTP {}",
                response.status()
            )))
        }
    }

    /// Probe the REST side; used at startup to fail fast when the switch is
    /// unreachable or the credentials are wrong.
    pub async fn check_connection(&self) -> Result<()> {
        let response = self
            .send(self.request(Method::GET, "/asterisk/info"), true)
            .await?;
        Self::expect_success(response, "asterisk info").await?;
        debug!("call-control REST connection verified");
        Ok(())
    }
}

#[async_trait]
impl CallControl for AriClient {
    async fn answer(&self, channel_id: &str) -> Result<()> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/channels/{channel_id}/answer")),
                true,
            )
            .await?;
        Self::expect_success(response, "answer").await?;
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> Result<()> {
        let response = self
            .send(
                self.request(Method::DELETE, &format!("/channels/{channel_id}")),
                true,
            )
            .await?;
        // Hanging up a channel that is already gone is not a failure.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response, "hangup").await?;
        Ok(())
    }

    async fn get_variable(&self, channel_id: &str, name: &str) -> Result<Option<String>> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/channels/{channel_id}/variable"))
                    .query(&[("variable", name)]),
                true,
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, "get variable").await?;
        let body: VariableValue = response
            .json()
            .await
            .map_err(|e| GatewayError::SwitchIo(format!("get variable body: {e}")))?;
        if body.value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(body.value))
        }
    }

    async fn get_all_variables(&self, channel_id: &str) -> Result<HashMap<String, String>> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/channels/{channel_id}/variables")),
                true,
            )
            .await?;
        let response = Self::expect_success(response, "get all variables").await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::SwitchIo(format!("get all variables body: {e}")))
    }

    async fn set_variable(&self, channel_id: &str, name: &str, value: &str) -> Result<()> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/channels/{channel_id}/variable"))
                    .query(&[("variable", name), ("value", value)]),
                true,
            )
            .await?;
        Self::expect_success(response, "set variable").await?;
        Ok(())
    }

    async fn continue_in_dialplan(&self, channel_id: &str) -> Result<()> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/channels/{channel_id}/continue")),
                false,
            )
            .await?;
        Self::expect_success(response, "continue").await?;
        Ok(())
    }

    async fn create_bridge(&self) -> Result<String> {
        let response = self
            .send(
                self.request(Method::POST, "/bridges").query(&[("type", "mixing")]),
                false,
            )
            .await?;
        let response = Self::expect_success(response, "create bridge").await?;
        let bridge: Bridge = response
            .json()
            .await
            .map_err(|e| GatewayError::SwitchIo(format!("create bridge body: {e}")))?;
        Ok(bridge.id)
    }

    async fn add_channel_to_bridge(&self, bridge_id: &str, channel_id: &str) -> Result<()> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/bridges/{bridge_id}/addChannel"))
                    .query(&[("channel", channel_id)]),
                true,
            )
            .await?;
        Self::expect_success(response, "add channel to bridge").await?;
        Ok(())
    }

    async fn destroy_bridge(&self, bridge_id: &str) -> Result<()> {
        let response = self
            .send(
                self.request(Method::DELETE, &format!("/bridges/{bridge_id}")),
                true,
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response, "destroy bridge").await?;
        Ok(())
    }

    async fn create_snoop_channel(
        &self,
        channel_id: &str,
        spy: &str,
        app_args: &str,
    ) -> Result<String> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/channels/{channel_id}/snoop"))
                    .query(&[
                        ("spy", spy),
                        ("app", self.config.app_name.as_str()),
                        ("appArgs", app_args),
                    ]),
                false,
            )
            .await?;
        let response = Self::expect_success(response, "create snoop channel").await?;
        let channel: Channel = response
            .json()
            .await
            .map_err(|e| GatewayError::SwitchIo(format!("snoop channel body: {e}")))?;
        Ok(channel.id)
    }

    async fn create_external_media_channel(
        &self,
        host: &str,
        port: u16,
        format: &str,
        app_args: &str,
    ) -> Result<String> {
        let external_host = format!("{host}:{port}");
        let response = self
            .send(
                self.request(Method::POST, "/channels/externalMedia").query(&[
                    ("app", self.config.app_name.as_str()),
                    ("external_host", external_host.as_str()),
                    ("format", format),
                    ("appArgs", app_args),
                ]),
                false,
            )
            .await?;
        let response = Self::expect_success(response, "create external media channel").await?;
        let channel: Channel = response
            .json()
            .await
            .map_err(|e| GatewayError::SwitchIo(format!("external media body: {e}")))?;
        Ok(channel.id)
    }

    async fn play_on_bridge(
        &self,
        bridge_id: &str,
        media_ref: &str,
        playback_id: &str,
    ) -> Result<()> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/bridges/{bridge_id}/play"))
                    .query(&[("media", media_ref), ("playbackId", playback_id)]),
                false,
            )
            .await?;
        let response = Self::expect_success(response, "play on bridge").await?;
        let playback: Playback = response
            .json()
            .await
            .map_err(|e| GatewayError::SwitchIo(format!("play body: {e}")))?;
        debug!(playback_id = %playback.id, media = %media_ref, "playback started");
        Ok(())
    }

    async fn stop_playback(&self, playback_id: &str) -> Result<()> {
        let response = self
            .send(
                self.request(Method::DELETE, &format!("/playbacks/{playback_id}")),
                true,
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            // Finished on its own before the stop arrived.
            return Ok(());
        }
        Self::expect_success(response, "stop playback").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_building() {
        let mut config = AriConfig::default();
        config.url = "http://pbx.example:8088/ari".into();
        config.username = "gw".into();
        config.password = "pw".into();
        let client = AriClient::new(config);
        let request = client
            .request(Method::POST, "/channels/c1/answer")
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "http://pbx.example:8088/ari/channels/c1/answer"
        );
        assert!(request.headers().contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_unreachable_switch_is_switch_io() {
        let mut config = AriConfig::default();
        // Discard port on loopback: connection refused immediately.
        config.url = "http://127.0.0.1:9/ari".into();
        config.username = "gw".into();
        config.password = "pw".into();
        let client = AriClient::new(config);
        let err = client.answer("c1").await.unwrap_err();
        assert!(matches!(err, GatewayError::SwitchIo(_)));
    }
}
