use std::sync::Arc;
use std::time::Duration;

use application::ChatGateway;
use config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ChatGateway>,
    /// 携带会话令牌的 cookie 名
    pub session_cookie: String,
    pub ping_interval: Duration,
}

impl AppState {
    pub fn new(gateway: Arc<ChatGateway>, session_cookie: impl Into<String>, ping_interval: Duration) -> Self {
        Self {
            gateway,
            session_cookie: session_cookie.into(),
            ping_interval,
        }
    }

    pub fn from_config(gateway: Arc<ChatGateway>, config: &AppConfig) -> Self {
        Self::new(gateway, config.auth.session_cookie.clone(), config.ping_interval())
    }
}
