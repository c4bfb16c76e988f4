//! Rebooting a camera over its ONVIF device service.
//!
//! Some cameras wedge their RTSP server in a way that no amount of
//! reconnecting fixes. For those, the supervisor asks the camera itself to
//! reboot via the ONVIF `SystemReboot` operation.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use ck_core::config::CameraConfig;
use ck_core::{Error, Result};
use rand::RngCore;
use reqwest::header::CONTENT_TYPE;
use sha1::{Digest, Sha1};

/// Path of the ONVIF device management service.
pub const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8; \
     action=\"http://www.onvif.org/ver10/device/wsdl/SystemReboot\"";

/// Asks a camera to reboot.
#[async_trait]
pub trait CameraRebooter: Send + Sync {
    async fn reboot(&self) -> Result<()>;
}

/// WS-Security password digest: `base64(sha1(nonce + created + password))`.
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    BASE64.encode(hasher.finalize())
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn reboot_envelope(username: &str, password: &str) -> String {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    let created = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let digest = password_digest(&nonce, &created, password);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Header>
    <wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"
                   xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
      <wsse:UsernameToken>
        <wsse:Username>{username}</wsse:Username>
        <wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{digest}</wsse:Password>
        <wsse:Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{nonce}</wsse:Nonce>
        <wsu:Created>{created}</wsu:Created>
      </wsse:UsernameToken>
    </wsse:Security>
  </s:Header>
  <s:Body>
    <SystemReboot xmlns="http://www.onvif.org/ver10/device/wsdl"/>
  </s:Body>
</s:Envelope>"#,
        username = escape_xml(username),
        digest = digest,
        nonce = BASE64.encode(nonce),
        created = created,
    )
}

fn is_soap_fault(body: &str) -> bool {
    body.contains(":Fault>") || body.contains("<Fault>") || body.contains("<Fault ")
}

/// ONVIF `SystemReboot` client for one camera.
#[derive(Debug, Clone)]
pub struct OnvifRebooter {
    client: reqwest::Client,
    camera: String,
    endpoint: String,
    username: String,
    password: String,
}

impl OnvifRebooter {
    /// Client for `http://<ip>:<onvif_port>/onvif/device_service`.
    pub fn new(camera: &CameraConfig, timeout: Duration) -> Result<Self> {
        let port = camera.onvif_port.ok_or_else(|| {
            Error::Validation(format!("camera '{}' has no onvif_port", camera.name))
        })?;
        let endpoint = format!("http://{}:{}{}", camera.ip, port, DEVICE_SERVICE_PATH);
        Self::with_endpoint(camera, endpoint, timeout)
    }

    /// Client for an explicit device service URL.
    pub fn with_endpoint(
        camera: &CameraConfig,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::reboot(&camera.name, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            camera: camera.name.clone(),
            endpoint: endpoint.into(),
            username: camera.username.clone(),
            password: camera.password.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CameraRebooter for OnvifRebooter {
    async fn reboot(&self) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(reboot_envelope(&self.username, &self.password))
            .send()
            .await
            .map_err(|e| Error::reboot(&self.camera, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::reboot(&self.camera, format!("failed to read response: {e}")))?;

        if status.as_u16() >= 400 {
            return Err(Error::reboot(&self.camera, format!("HTTP {status}")));
        }
        if is_soap_fault(&body) {
            return Err(Error::reboot(&self.camera, "camera returned a SOAP fault"));
        }

        tracing::info!(camera = %self.camera, "Camera accepted reboot request");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn camera() -> CameraConfig {
        CameraConfig {
            name: "front".into(),
            ip: "10.0.0.2".into(),
            port: 554,
            username: "admin".into(),
            password: "secret".into(),
            onvif_port: Some(8000),
            reboot_on_failure: true,
            streams: vec![],
        }
    }

    const REBOOT_OK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body>
<tds:SystemRebootResponse xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
<tds:Message>Rebooting in 30 seconds</tds:Message></tds:SystemRebootResponse>
</s:Body></s:Envelope>"#;

    #[test]
    fn digest_known_vector() {
        // nonce, created and password from the WS-Security UsernameToken
        // profile example.
        let nonce = BASE64.decode("LKqI6G/AikKCQrN0zqZFlg==").unwrap();
        let digest = password_digest(&nonce, "2010-09-16T07:50:45Z", "userpassword");
        assert_eq!(digest, "tuOSpGlFlIXsozq4HFNeeGeFLEI=");
    }

    #[test]
    fn endpoint_from_camera() {
        let rebooter = OnvifRebooter::new(&camera(), Duration::from_secs(1)).unwrap();
        assert_eq!(rebooter.endpoint(), "http://10.0.0.2:8000/onvif/device_service");
    }

    #[test]
    fn missing_onvif_port_is_rejected() {
        let cam = CameraConfig {
            onvif_port: None,
            ..camera()
        };
        assert!(OnvifRebooter::new(&cam, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn envelope_carries_username_token() {
        let xml = reboot_envelope("a<b", "secret");
        assert!(xml.contains("<wsse:Username>a&lt;b</wsse:Username>"));
        assert!(xml.contains("#PasswordDigest"));
        assert!(xml.contains("<SystemReboot"));
        assert!(!xml.contains("secret"));
    }

    #[tokio::test]
    async fn successful_reboot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_SERVICE_PATH))
            .and(header("content-type", SOAP_CONTENT_TYPE))
            .and(body_string_contains("SystemReboot"))
            .and(body_string_contains("<wsse:Username>admin</wsse:Username>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REBOOT_OK))
            .expect(1)
            .mount(&server)
            .await;

        let rebooter = OnvifRebooter::with_endpoint(
            &camera(),
            format!("{}{}", server.uri(), DEVICE_SERVICE_PATH),
            Duration::from_secs(5),
        )
        .unwrap();
        rebooter.reboot().await.unwrap();
    }

    #[tokio::test]
    async fn http_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let rebooter = OnvifRebooter::with_endpoint(
            &camera(),
            format!("{}{}", server.uri(), DEVICE_SERVICE_PATH),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = rebooter.reboot().await.unwrap_err();
        assert!(matches!(err, Error::Reboot { .. }));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn soap_fault_is_failure() {
        let server = MockServer::start().await;
        let fault = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body>
<s:Fault><s:Code><s:Value>s:Sender</s:Value></s:Code></s:Fault></s:Body></s:Envelope>"#;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fault))
            .mount(&server)
            .await;

        let rebooter = OnvifRebooter::with_endpoint(
            &camera(),
            format!("{}{}", server.uri(), DEVICE_SERVICE_PATH),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = rebooter.reboot().await.unwrap_err();
        assert!(err.to_string().contains("SOAP fault"));
    }

    #[tokio::test]
    async fn slow_camera_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(REBOOT_OK)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let rebooter = OnvifRebooter::with_endpoint(
            &camera(),
            format!("{}{}", server.uri(), DEVICE_SERVICE_PATH),
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(rebooter.reboot().await.is_err());
    }
}
