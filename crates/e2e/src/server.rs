//! Site server management - attaching to or spawning the site under test

use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use railguide_common::SiteConfig;

use crate::error::{E2eError, E2eResult};

/// The site under test, either already running or started by us
pub struct SiteServer {
    child: Option<Child>,
    base_url: String,
}

impl SiteServer {
    /// Use a site that is already running at `base_url`
    pub async fn attach(config: &SiteConfig) -> E2eResult<Self> {
        let server = SiteServer {
            child: None,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        };
        server
            .wait_for_healthy(&config.health_path, Duration::from_secs(config.startup_timeout_secs))
            .await?;
        info!("Site is reachable at {}", server.base_url);
        Ok(server)
    }

    /// Start the site with its configured shell command
    pub async fn spawn(config: &SiteConfig) -> E2eResult<Self> {
        let command = config
            .start_command
            .as_deref()
            .ok_or_else(|| E2eError::SiteStartup("no start_command configured".to_string()))?;

        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", port);

        info!("Starting site with `{}` on port {}", command, port);

        // Nothing drains the site's output, so it must never go to a pipe
        let stderr = if tracing::enabled!(tracing::Level::DEBUG) {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let child = Command::new("sh")
            .args(["-c", command])
            .env("PORT", port.to_string())
            .env("HOST", "127.0.0.1")
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|e| E2eError::SiteStartup(format!("failed to run `{}`: {}", command, e)))?;

        let server = SiteServer {
            child: Some(child),
            base_url,
        };

        server
            .wait_for_healthy(&config.health_path, Duration::from_secs(config.startup_timeout_secs))
            .await?;

        info!("Site is healthy at {}", server.base_url);
        Ok(server)
    }

    /// Attach or spawn depending on whether a start command is configured
    pub async fn start(config: &SiteConfig) -> E2eResult<Self> {
        if config.start_command.is_some() {
            Self::spawn(config).await
        } else {
            Self::attach(config).await
        }
    }

    async fn wait_for_healthy(&self, health_path: &str, timeout: Duration) -> E2eResult<()> {
        let health_url = format!("{}{}", self.base_url, health_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => warn!("Health check returned {}", resp.status()),
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for site at {}...", health_url);
                    }
                    // Connection refused is expected while the site starts
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::SiteHealthCheck(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether this handle owns a site process
    pub fn is_spawned(&self) -> bool {
        self.child.is_some()
    }

    /// Stop a spawned site. Attached sites are left running.
    pub fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        info!("Stopping site (pid: {})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        if child.try_wait()?.is_none() {
            child.kill()?;
        }
        child.wait()?;

        Ok(())
    }
}

impl Drop for SiteServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop site: {}", e);
        }
    }
}

/// Ask the OS for an unused local port
pub fn find_free_port() -> E2eResult<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 0);
    }

    #[tokio::test]
    async fn test_spawn_requires_command() {
        let config = SiteConfig::default();
        assert!(matches!(
            SiteServer::spawn(&config).await,
            Err(E2eError::SiteStartup(_))
        ));
    }

    /// Answers every request with an empty 200 until the test ends
    async fn serve_ok(listener: tokio::net::TcpListener) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_site_is_not_blocked_by_stderr_output() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let health = tokio::spawn(serve_ok(listener));

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("past-stderr");
        let config = SiteConfig {
            // Far more than a pipe buffer holds
            start_command: Some(format!(
                "head -c 300000 /dev/zero >&2; touch {}; exec sleep 30",
                marker.display()
            )),
            port: Some(port),
            startup_timeout_secs: 5,
            ..SiteConfig::default()
        };

        let mut server = SiteServer::spawn(&config).await.unwrap();
        let start = std::time::Instant::now();
        while !marker.exists() && start.elapsed() < Duration::from_secs(5) {
            sleep(Duration::from_millis(50)).await;
        }
        let written = marker.exists();
        server.stop().unwrap();
        health.abort();

        assert!(written, "site blocked writing to stderr");
    }

    #[tokio::test]
    async fn test_attach_to_unreachable_site_fails() {
        let port = find_free_port().unwrap();
        let config = SiteConfig {
            base_url: format!("http://127.0.0.1:{}", port),
            startup_timeout_secs: 1,
            ..SiteConfig::default()
        };
        assert!(matches!(
            SiteServer::attach(&config).await,
            Err(E2eError::SiteHealthCheck(_))
        ));
    }
}
