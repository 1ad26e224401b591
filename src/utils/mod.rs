pub mod cookie;
pub mod form;
mod headers;
mod methods;
pub mod mime;

pub use cookie::{Cookie, CookieJar, SameSite};
pub use form::{FormDict, FormValue, Upload};
pub use headers::{HttpHeaders, title_case};
pub use methods::HttpMethod;
