//! Web session credentials for the agent account.
//!
//! Publishing surfaces (photo albums, channels) authenticate with the
//! agent's web cookies plus a CSRF token derived from the `p_skey` cookie.
//! This module only obtains those credentials; HTTP clients are left to the
//! caller.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::constants::actions;
use crate::engine::Engine;
use crate::error::EngineError;

/// Cookies of the agent account for one web domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSession {
    /// Account the cookies belong to.
    pub uin: i64,
    /// Cookie name → value.
    pub cookies: HashMap<String, String>,
}

impl PublisherSession {
    /// Build a session from a `Cookie` header style string (`a=b; c=d`).
    ///
    /// Pairs without `=` are skipped; later duplicates win.
    #[must_use]
    pub fn from_cookie_header(uin: i64, header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        Self { uin, cookies }
    }

    /// Value of one cookie.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// CSRF token derived from the `p_skey` cookie, if present.
    #[must_use]
    pub fn g_tk(&self) -> Option<u32> {
        self.cookie("p_skey").map(csrf_token)
    }

    /// Cookies rendered back into a `Cookie` header value, sorted by name.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        let mut pairs: Vec<_> = self.cookies.iter().collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// DJB-style hash over the characters of `key`, truncated to 31 bits.
#[must_use]
#[allow(clippy::cast_possible_truncation, reason = "masked to 31 bits")]
pub fn csrf_token(key: &str) -> u32 {
    let hash = key.chars().fold(5381_u64, |hash, c| {
        hash.wrapping_add((hash << 5).wrapping_add(u64::from(u32::from(c))))
    });
    (hash & 0x7fff_ffff) as u32
}

impl Engine {
    /// Fetch the agent's web cookies for `domain`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Protocol`] if the agent's own id is not known yet
    ///   or the agent refused the call.
    /// - [`EngineError::Decode`] if the response carries no cookie string.
    /// - Any error of [`Engine::call_api`].
    pub async fn publisher_session(&self, domain: &str) -> Result<PublisherSession, EngineError> {
        let uin = self
            .me()
            .map(|me| me.user_id)
            .or_else(|| self.agent_id())
            .ok_or_else(|| EngineError::Protocol("agent identity not known yet".to_string()))?;

        let response = self
            .call_api(actions::GET_COOKIES, Some(json!({ "domain": domain })))
            .await?;
        if !response.is_ok() {
            return Err(EngineError::Protocol(format!(
                "get_cookies for {} failed: status {} retcode {}",
                domain, response.status, response.retcode
            )));
        }
        let header = response
            .data
            .get("cookies")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Decode("get_cookies response without cookies".to_string()))?;

        log::debug!("[{}] Obtained web cookies for {}", self.tag(), domain);
        Ok(PublisherSession::from_cookie_header(uin, header))
    }
}
