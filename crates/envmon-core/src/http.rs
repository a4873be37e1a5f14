//! Minimal HTTP request routing for the reading endpoint.
//!
//! Only the request line is looked at. Routes:
//! - `GET /?...sensor=N...` with a configured sensor `N` → 200, reading as text
//! - `GET /` or `GET /?...` otherwise → 307 to `/?sensor=0`
//! - anything else → 404
//!
//! `N` is the first digit after the last `sensor=` in the query, so
//! `/?sensor=12` serves sensor 1. Targets may contain spaces; the version
//! is taken from the last ` HTTP/` on the line. A line without a parseable
//! HTTP version gets no response at all.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Body used when a reading is unknown.
pub const PLACEHOLDER: &str = "??";

/// Body of every 404 response.
pub const NOT_FOUND_BODY: &str = "404 Error: Not Found";

fn request_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*) HTTP/(\d+\.?\d*)").expect("request line pattern is valid")
    })
}

fn root_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(?:\?.*)?$").expect("root pattern is valid"))
}

fn sensor_query_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/\?.*sensor=(\d)").expect("sensor query pattern is valid")
    })
}

/// A parsed `METHOD TARGET HTTP/VERSION` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub target: &'a str,
    pub version: &'a str,
}

impl<'a> RequestLine<'a> {
    /// Parse a request line, or `None` if it carries no HTTP version.
    ///
    /// The method is everything up to the first space; the target is the
    /// rest, spaces included.
    pub fn parse(line: &'a str) -> Option<Self> {
        let captures = request_line_regex().captures(line.trim_end())?;
        let head = captures.get(1)?.as_str();
        let (method, target) = head.split_once(' ').unwrap_or((head, ""));
        Some(Self {
            method,
            target,
            version: captures.get(2)?.as_str(),
        })
    }
}

/// Where a request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Serve the reading of this sensor.
    Sensor(usize),
    /// Redirect to the first sensor.
    Redirect,
    NotFound,
}

impl Route {
    /// Route a request for a device with `sensor_count` sensors.
    pub fn resolve(request: &RequestLine<'_>, sensor_count: usize) -> Self {
        if request.method != "GET" || !root_regex().is_match(request.target) {
            return Route::NotFound;
        }

        let index = sensor_query_regex()
            .captures(request.target)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok());

        match index {
            Some(index) if index < sensor_count => Route::Sensor(index),
            _ => Route::Redirect,
        }
    }
}

/// Response status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    TemporaryRedirect,
    NotFound,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::TemporaryRedirect => 307,
            Status::NotFound => 404,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::TemporaryRedirect => "Temporary Redirect",
            Status::NotFound => "Not Found",
        }
    }
}

/// A complete response, ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: String,
    pub status: Status,
    pub location: Option<String>,
    pub body: String,
}

impl Response {
    /// Serialize head and body.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP/{} {} {}\r\n",
            self.version,
            self.status.code(),
            self.status.reason()
        )?;
        match &self.location {
            Some(location) => write!(f, "Location: {}\r\n", location)?,
            None => write!(f, "Content-type: text/plain\r\n")?,
        }
        write!(f, "\r\n{}", self.body)
    }
}

/// Text form of a reading: natural number formatting, or the placeholder.
pub fn reading_body(value: Option<f32>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

/// Build the response to a request line.
///
/// `values` are the latest readings in sensor order, `host` is the address
/// used in the redirect location. Returns `None` for a malformed request
/// line; the caller closes the connection without answering.
pub fn respond(line: &str, values: &[Option<f32>], host: &str) -> Option<Response> {
    let request = RequestLine::parse(line)?;
    let version = request.version.to_string();

    let response = match Route::resolve(&request, values.len()) {
        Route::Sensor(index) => Response {
            version,
            status: Status::Ok,
            location: None,
            body: reading_body(values[index]),
        },
        Route::Redirect => Response {
            version,
            status: Status::TemporaryRedirect,
            location: Some(format!("http://{}/?sensor=0", host)),
            body: reading_body(values.first().copied().flatten()),
        },
        Route::NotFound => Response {
            version,
            status: Status::NotFound,
            location: None,
            body: NOT_FOUND_BODY.to_string(),
        },
    };
    Some(response)
}

/// Whether `ip` is four dot-separated decimal octets, each in `0..=255`.
pub fn is_valid_ipv4(ip: &str) -> bool {
    let octets: Vec<&str> = ip.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|octet| {
            !octet.is_empty()
                && octet.bytes().all(|b| b.is_ascii_digit())
                && octet.parse::<u16>().map_or(false, |v| v <= 255)
        })
}

/// Whether `port` fits a TCP port number.
pub fn is_valid_port(port: u32) -> bool {
    port <= u32::from(u16::MAX)
}
