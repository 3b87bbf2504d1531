use actix_web::middleware::Next;
use actix_web::{
    Error, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web,
};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

/// 请求头中的共享密钥
pub const API_KEY_HEADER: &str = "API-KEY";

/// 配置的共享密钥，空字符串视为未设置
#[derive(Clone, Debug, Default)]
pub struct ApiKey(Option<String>);

impl ApiKey {
    pub fn new(key: Option<&str>) -> Self {
        Self(key.filter(|k| !k.is_empty()).map(str::to_string))
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    fn matches(&self, presented: Option<&[u8]>) -> bool {
        match (&self.0, presented) {
            (Some(expected), Some(presented)) => expected.as_bytes().ct_eq(presented).into(),
            _ => false,
        }
    }
}

pub struct ApiKeyAuth;

impl ApiKeyAuth {
    /// 配置了密钥时才校验
    pub async fn optional(
        req: ServiceRequest,
        next: Next<BoxBody>,
    ) -> Result<ServiceResponse<BoxBody>, Error> {
        Self::check(req, next, false).await
    }

    /// 必须配置密钥且请求携带正确密钥
    pub async fn required(
        req: ServiceRequest,
        next: Next<BoxBody>,
    ) -> Result<ServiceResponse<BoxBody>, Error> {
        Self::check(req, next, true).await
    }

    async fn check(
        req: ServiceRequest,
        next: Next<BoxBody>,
        enforce: bool,
    ) -> Result<ServiceResponse<BoxBody>, Error> {
        let key = req
            .app_data::<web::Data<ApiKey>>()
            .map(|k| k.get_ref().clone())
            .unwrap_or_default();

        if !key.is_set() && !enforce {
            return next.call(req).await;
        }

        let presented = req.headers().get(API_KEY_HEADER).map(|v| v.as_bytes());
        if key.matches(presented) {
            debug!("API key accepted for {}", req.path());
            return next.call(req).await;
        }

        info!("API key rejected for {}", req.path());
        Ok(req.into_response(
            HttpResponse::Unauthorized()
                .json(serde_json::json!({ "error": "Sorry, this API requires a key" })),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_matching() {
        let key = ApiKey::new(Some("s3cret"));
        assert!(key.is_set());
        assert!(key.matches(Some(b"s3cret")));
        assert!(!key.matches(Some(b"s3cre")));
        assert!(!key.matches(None));
    }

    #[test]
    fn test_empty_key_is_unset() {
        let key = ApiKey::new(Some(""));
        assert!(!key.is_set());
        assert!(!key.matches(Some(b"")));
    }
}
