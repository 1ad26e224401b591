use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{HandlerResult, HttpError};
use crate::request::Request;
use crate::response::Response;
use crate::router::Params;

type Coercion = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Checks and coerces route captures before the handler runs.
///
/// A missing capture or a failed coercion aborts with 403. Coerced values
/// replace the raw captures, so `"007"` coerced as `u32` reaches the handler
/// as `"7"`.
///
/// ```
/// use decanter::{Application, Body, Validator};
///
/// let app = Application::new();
/// app.route(
///     "/user/:id",
///     Validator::new().coerce::<u32>("id").wrap(|_req, _res, params| {
///         Ok(Body::from(format!("user {}", params.get("id").unwrap_or("?"))))
///     }),
/// )
/// .unwrap();
/// ```
#[derive(Clone, Default)]
pub struct Validator {
    rules: Vec<(String, Coercion)>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `name` to parse as `T`.
    pub fn coerce<T>(self, name: &str) -> Self
    where
        T: FromStr + Display + 'static,
    {
        self.with(name, |raw| {
            raw.parse::<T>()
                .map(|v| v.to_string())
                .map_err(|_| format!("cannot parse `{}`", raw))
        })
    }

    /// Requires `name` to pass a custom coercion.
    pub fn with<F>(mut self, name: &str, coercion: F) -> Self
    where
        F: Fn(&str) -> Result<String, String> + Send + Sync + 'static,
    {
        self.rules.push((name.to_string(), Arc::new(coercion)));
        self
    }

    pub fn wrap<F>(self, handler: F) -> impl Fn(&Request, &mut Response, &Params) -> HandlerResult + Send + Sync + 'static
    where
        F: Fn(&Request, &mut Response, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        move |request: &Request, response: &mut Response, params: &Params| {
            let coerced = self.apply(params)?;
            handler(request, response, &coerced)
        }
    }

    fn apply(&self, params: &Params) -> Result<Params, HttpError> {
        let mut coerced = params.clone();
        for (name, coercion) in &self.rules {
            let raw = params
                .get(name)
                .ok_or_else(|| HttpError::new(403, format!("Missing parameter: {}", name)))?;
            let value = coercion(raw)
                .map_err(|_| HttpError::new(403, format!("Wrong parameter format for: {}", name)))?;
            coerced.insert(name, value);
        }
        Ok(coerced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::environ::Environ;
    use crate::error::Signal;

    fn call(validator: Validator, params: Params) -> HandlerResult {
        let handler = validator.wrap(|_: &Request, _: &mut Response, params: &Params| {
            Ok(Body::from(params.get("n").unwrap_or("-").to_string()))
        });
        let req = Request::new(Environ::new());
        let mut res = Response::new();
        handler(&req, &mut res, &params)
    }

    #[test]
    fn coerces_and_forwards() {
        let params: Params = [("n", "007")].into_iter().collect();
        let body = call(Validator::new().coerce::<u32>("n"), params).unwrap();
        assert_eq!(body.into_response_body(None).into_bytes().unwrap(), b"7");
    }

    #[test]
    fn missing_or_invalid_is_forbidden() {
        let err = call(Validator::new().coerce::<u32>("n"), Params::new()).unwrap_err();
        assert!(matches!(err, Signal::Http(HttpError { status: 403, .. })));

        let params: Params = [("n", "Tim")].into_iter().collect();
        let err = call(Validator::new().coerce::<u32>("n"), params).unwrap_err();
        match err {
            Signal::Http(e) => {
                assert_eq!(e.status, 403);
                assert!(e.text.contains("n"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn custom_coercion() {
        let upper = Validator::new().with("n", |raw| {
            if raw.chars().all(char::is_alphabetic) {
                Ok(raw.to_uppercase())
            } else {
                Err("letters only".into())
            }
        });
        let params: Params = [("n", "tim")].into_iter().collect();
        let body = call(upper, params).unwrap();
        assert_eq!(body.into_response_body(None).into_bytes().unwrap(), b"TIM");
    }
}
