//! Per-client-IP request throttling.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::AppError;

/// Stale keys are purged once more than this many clients are tracked.
const EVICTION_THRESHOLD: usize = 10_000;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Shared limiter state. Cheap to clone; every worker gets a handle to the same buckets.
#[derive(Clone)]
pub struct ClientRateLimiter {
    limiter: Arc<KeyedLimiter>,
    per_minute: u32,
}

impl ClientRateLimiter {
    /// Allows a burst of `per_minute` requests per client, refilled at `per_minute` per minute.
    pub fn per_minute(per_minute: NonZeroU32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            per_minute: per_minute.get(),
        }
    }

    /// Records one request from `client`, failing with `TooManyRequests` when over quota.
    pub fn check(&self, client: &str) -> Result<(), AppError> {
        if self.limiter.len() > EVICTION_THRESHOLD {
            self.limiter.retain_recent();
        }

        self.limiter.check_key(&client.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            AppError::TooManyRequests {
                message: format!("Rate limit exceeded: {} per 1 minute", self.per_minute),
                retry_after_secs: wait.as_secs().max(1),
            }
        })
    }
}

/// Middleware applying a [`ClientRateLimiter`] keyed by the peer IP address.
pub struct RateLimit {
    limiter: ClientRateLimiter,
}

impl RateLimit {
    pub fn new(limiter: ClientRateLimiter) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service,
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitService<S> {
    service: S,
    limiter: ClientRateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let client = client_key(&req);
        match self.limiter.check(&client) {
            Ok(()) => {
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(app_err) => {
                log::warn!("rate limit exceeded for {} on {}", client, req.path());
                let response = req.into_response(app_err.error_response());
                Box::pin(async move { Ok(response.map_into_right_body()) })
            }
        }
    }
}

/// The socket peer's IP. Forwarded headers are ignored since clients can forge them.
fn client_key(req: &ServiceRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{call_service, init_service, TestRequest};
    use actix_web::{http::StatusCode, web, App, HttpResponse};
    use std::net::SocketAddr;

    fn limiter(per_minute: u32) -> ClientRateLimiter {
        ClientRateLimiter::per_minute(NonZeroU32::new(per_minute).unwrap())
    }

    #[test]
    fn test_check_allows_burst_then_rejects() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1").is_ok());
        }
        match limiter.check("10.0.0.1") {
            Err(AppError::TooManyRequests {
                message,
                retry_after_secs,
            }) => {
                assert_eq!(message, "Rate limit exceeded: 3 per 1 minute");
                assert!(retry_after_secs >= 1);
            }
            other => panic!("expected TooManyRequests, got {:?}", other),
        }
        // A different client has its own bucket.
        assert!(limiter.check("10.0.0.2").is_ok());
    }

    #[actix_rt::test]
    async fn test_middleware_limits_per_peer() {
        let app = init_service(
            App::new()
                .wrap(RateLimit::new(limiter(2)))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let alice: SocketAddr = "192.0.2.10:40000".parse().unwrap();
        let bob: SocketAddr = "192.0.2.20:40000".parse().unwrap();

        for _ in 0..2 {
            let req = TestRequest::get().uri("/").peer_addr(alice).to_request();
            assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
        }

        let req = TestRequest::get().uri("/").peer_addr(alice).to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key("retry-after"));

        let req = TestRequest::get().uri("/").peer_addr(bob).to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
    }
}
