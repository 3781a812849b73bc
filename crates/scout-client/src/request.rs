use std::fmt;

use scout_common::Deadline;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            other => Err(format!("unsupported method '{other}'")),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        }
    }
}

/// An immutable call against the search node.
///
/// Built once through [`RequestBuilder`] and consumed by
/// [`AsyncRequestExecutor::submit`](crate::AsyncRequestExecutor::submit).
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    path: String,
    parameters: Vec<(String, String)>,
    body_parts: Vec<Value>,
    ndjson: bool,
    deadline: Option<Deadline>,
}

impl Request {
    pub fn builder(method: Method) -> RequestBuilder {
        RequestBuilder::new(method)
    }

    pub fn get() -> RequestBuilder {
        RequestBuilder::new(Method::Get)
    }

    pub fn put() -> RequestBuilder {
        RequestBuilder::new(Method::Put)
    }

    pub fn post() -> RequestBuilder {
        RequestBuilder::new(Method::Post)
    }

    pub fn delete() -> RequestBuilder {
        RequestBuilder::new(Method::Delete)
    }

    pub fn head() -> RequestBuilder {
        RequestBuilder::new(Method::Head)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Percent-encoded path, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    pub fn body_parts(&self) -> &[Value] {
        &self.body_parts
    }

    /// Body goes out as newline-delimited JSON even with a single part.
    pub fn is_ndjson(&self) -> bool {
        self.ndjson
    }

    pub fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    path: String,
    parameters: Vec<(String, String)>,
    body_parts: Vec<Value>,
    ndjson: bool,
    deadline: Option<Deadline>,
}

impl RequestBuilder {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            path: String::new(),
            parameters: Vec::new(),
            body_parts: Vec::new(),
            ndjson: false,
            deadline: None,
        }
    }

    /// Append one path segment, percent-encoding it.
    pub fn path_component(mut self, component: &str) -> Self {
        self.path.push('/');
        self.path.push_str(&urlencoding::encode(component));
        self
    }

    /// Append one segment made of several values joined by `,` (e.g. index lists).
    pub fn multi_valued_path_component<S: AsRef<str>>(mut self, values: &[S]) -> Self {
        let joined = values
            .iter()
            .map(|v| urlencoding::encode(v.as_ref()).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        self.path.push('/');
        self.path.push_str(&joined);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.push((name.into(), value.to_string()));
        self
    }

    /// Append one JSON object to the body. Several parts are sent as NDJSON.
    pub fn body(mut self, part: Value) -> Self {
        self.body_parts.push(part);
        self
    }

    pub fn bodies(mut self, parts: impl IntoIterator<Item = Value>) -> Self {
        self.body_parts.extend(parts);
        self
    }

    /// Send the body as NDJSON, one line per part, whatever the part count.
    /// Bulk endpoints require this.
    pub fn ndjson(mut self) -> Self {
        self.ndjson = true;
        self
    }

    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn build(self) -> Request {
        let path = if self.path.is_empty() {
            "/".to_string()
        } else {
            self.path
        };
        Request {
            method: self.method,
            path,
            parameters: self.parameters,
            body_parts: self.body_parts,
            ndjson: self.ndjson,
            deadline: self.deadline,
        }
    }
}
