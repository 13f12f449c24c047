//! HTTP client for a CozoDB server.
//!
//! Every script is one `POST {host}/text-query` with a JSON body of
//! `{"script": ..., "params": {...}}`. No retries; the client's default
//! timeout applies.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::backend::QueryOutput;
use crate::config::DatalogConfig;
use crate::error::{CrmError, Result};
use crate::row::Row;

/// Header carrying the static auth token.
pub const AUTH_HEADER: &str = "x-cozo-auth";

/// Something that can execute a Datalog script with parameters.
pub trait ScriptRunner: Send + Sync {
    fn run_script(&self, script: &str, params: &Map<String, Value>) -> Result<QueryOutput>;
}

/// Response envelope from `/text-query`.
#[derive(Debug, Deserialize)]
struct TextQueryResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    headers: Vec<String>,
    #[serde(default)]
    rows: Vec<Row>,
    message: Option<String>,
    display: Option<String>,
}

/// Blocking HTTP runner.
pub struct CozoClient {
    endpoint: String,
    auth_token: Option<String>,
    http: reqwest::blocking::Client,
}

impl CozoClient {
    pub fn new(config: &DatalogConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            endpoint: text_query_url(&config.host),
            auth_token: config.auth_token.clone(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ScriptRunner for CozoClient {
    fn run_script(&self, script: &str, params: &Map<String, Value>) -> Result<QueryOutput> {
        debug!(endpoint = %self.endpoint, script, "posting script");

        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "script": script, "params": params }));
        if let Some(token) = &self.auth_token {
            request = request.header(AUTH_HEADER, token.as_str());
        }

        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        parse_response(status, &body)
    }
}

/// Build the query URL from a configured host.
pub fn text_query_url(host: &str) -> String {
    format!("{}/text-query", host.trim_end_matches('/'))
}

/// Turn a `/text-query` reply into rows or an error.
///
/// The engine answers failed queries with `ok: false` and a message,
/// usually alongside a 4xx status.
pub(crate) fn parse_response(status: StatusCode, body: &str) -> Result<QueryOutput> {
    match serde_json::from_str::<TextQueryResponse>(body) {
        Ok(reply) if reply.ok => Ok(QueryOutput {
            headers: reply.headers,
            rows: reply.rows,
        }),
        Ok(reply) => Err(CrmError::Query(
            reply
                .message
                .or(reply.display)
                .unwrap_or_else(|| format!("HTTP {}", status)),
        )),
        Err(_) if !status.is_success() => {
            Err(CrmError::Query(format!("HTTP {}: {}", status, body.trim())))
        }
        Err(e) => Err(CrmError::Json(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Accept one request on a loopback port, answer with `reply`, and hand
    /// back the request head and body.
    fn serve_once(reply: &'static str) -> (String, JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut head = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line.is_empty() || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }

            let length = head
                .lines()
                .find_map(|line| {
                    let (key, value) = line.split_once(':')?;
                    key.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);
            let mut body = vec![0; length];
            reader.read_exact(&mut body).unwrap();

            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.len(),
                reply
            )
            .unwrap();
            (head, String::from_utf8(body).unwrap())
        });

        (host, handle)
    }

    fn client(host: String, auth_token: Option<&str>) -> CozoClient {
        let config = DatalogConfig {
            host,
            auth_token: auth_token.map(String::from),
            ..DatalogConfig::default()
        };
        CozoClient::new(&config).unwrap()
    }

    #[test]
    fn test_posts_script_and_params_with_token() {
        let (host, server) = serve_once(r#"{"ok": true, "headers": ["a"], "rows": [[1]]}"#);

        let mut params = Map::new();
        params.insert("x".into(), json!(1));
        let output = client(host, Some("tok"))
            .run_script("?[a] := a = $x", &params)
            .unwrap();
        assert_eq!(output.headers, vec!["a"]);
        assert_eq!(output.rows.len(), 1);

        let (head, body) = server.join().unwrap();
        assert!(head.starts_with("POST /text-query HTTP/1.1\r\n"), "{head}");
        assert!(
            head.lines()
                .any(|line| line.eq_ignore_ascii_case("x-cozo-auth: tok")),
            "{head}"
        );
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body, json!({"script": "?[a] := a = $x", "params": {"x": 1}}));
    }

    #[test]
    fn test_no_auth_header_without_token() {
        let (host, server) = serve_once(r#"{"ok": true, "headers": [], "rows": []}"#);

        let output = client(host, None).run_script("::relations", &Map::new()).unwrap();
        assert!(output.rows.is_empty());

        let (head, body) = server.join().unwrap();
        assert!(!head.to_ascii_lowercase().contains(AUTH_HEADER), "{head}");
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body, json!({"script": "::relations", "params": {}}));
    }

    #[test]
    fn test_text_query_url() {
        assert_eq!(
            text_query_url("http://127.0.0.1:9070"),
            "http://127.0.0.1:9070/text-query"
        );
        assert_eq!(text_query_url("http://cozo/"), "http://cozo/text-query");
    }

    #[test]
    fn test_client_uses_configured_host() {
        let config = DatalogConfig {
            host: "http://cozo:9070/".into(),
            ..DatalogConfig::default()
        };
        let client = CozoClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://cozo:9070/text-query");
    }

    #[test]
    fn test_parse_ok_response() {
        let body = r#"{"ok": true, "headers": ["name", "data"],
            "rows": [["Alice", {"job": "Dev"}]], "took": 0.001}"#;
        let output = parse_response(StatusCode::OK, body).unwrap();
        assert_eq!(output.headers, vec!["name", "data"]);
        assert_eq!(output.rows.len(), 1);
        assert_eq!(output.rows[0].str_at(0, "name"), Some("Alice"));
    }

    #[test]
    fn test_parse_engine_error() {
        let body = r#"{"ok": false, "message": "stored relation 'nope' not found",
            "display": "long form"}"#;
        let err = parse_response(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert_eq!(
            err.to_string(),
            "query failed: stored relation 'nope' not found"
        );
    }

    #[test]
    fn test_parse_error_without_message() {
        let err = parse_response(StatusCode::BAD_REQUEST, r#"{"ok": false}"#).unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[test]
    fn test_parse_non_json_failure() {
        let err = parse_response(StatusCode::UNAUTHORIZED, "unauthorized\n").unwrap_err();
        assert!(matches!(err, CrmError::Query(ref m) if m.contains("401") && m.ends_with("unauthorized")));

        let err = parse_response(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, CrmError::Json(_)));
    }
}
