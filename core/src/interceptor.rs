//! Hooks that adjust a resolved request before it is sent.

use uuid::Uuid;

use crate::http::RequestPlan;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Runs after resolution, in registration order, once per call.
pub trait RequestInterceptor: Send + Sync {
    fn apply(&self, plan: &mut RequestPlan);
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut RequestPlan) + Send + Sync,
{
    fn apply(&self, plan: &mut RequestPlan) {
        self(plan)
    }
}

/// Stamps a fresh v4 UUID as `X-Request-Id` unless the call already set one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdInterceptor;

impl RequestInterceptor for RequestIdInterceptor {
    fn apply(&self, plan: &mut RequestPlan) {
        if !plan.has_header(REQUEST_ID_HEADER) {
            plan.append_header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Verb;

    #[test]
    fn request_id_is_added_once() {
        let mut plan = RequestPlan::new(Verb::Get, "http://localhost/");
        RequestIdInterceptor.apply(&mut plan);
        let id = plan.header(REQUEST_ID_HEADER).unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok());

        RequestIdInterceptor.apply(&mut plan);
        assert_eq!(plan.header_values(REQUEST_ID_HEADER), vec![id.as_str()]);
    }

    #[test]
    fn existing_request_id_is_kept() {
        let mut plan = RequestPlan::new(Verb::Get, "http://localhost/");
        plan.append_header("x-request-id", "caller-chosen");
        RequestIdInterceptor.apply(&mut plan);
        assert_eq!(plan.header(REQUEST_ID_HEADER), Some("caller-chosen"));
    }
}
