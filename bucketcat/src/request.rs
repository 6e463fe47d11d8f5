// bucketcat is a command-line HTTP(S) fetcher exercising the bucket pipeline.
// Copyright (C) 2026  bucket-pipeline contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use bucket_core::{AggregateBucket, HeaderTable, SimpleBucket};
use bytes::Bytes;
use url::Url;

/// Builds the request-side bucket chain (§4.10): a request line, a
/// `Headers` bucket, and (optionally) a `Simple` body, concatenated as an
/// `Aggregate`. This is the mirror image of `ResponseBucket` on the write
/// side — the pipeline's "produce HTTP request bytes" half of §1's purpose
/// statement.
pub fn build(method: &str, url: &Url, extra_headers: &[(String, String)], body: Option<Bytes>) -> AggregateBucket {
    let mut target = url.path().to_string();
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let request_line = format!("{method} {target} HTTP/1.1\r\n");

    let mut headers = HeaderTable::new();
    if let Some(host) = url.host_str() {
        match url.port() {
            Some(port) => headers.set("Host", format!("{host}:{port}")),
            None => headers.set("Host", host.to_string()),
        }
    }
    headers.set("User-Agent", concat!("bucketcat/", env!("CARGO_PKG_VERSION")));
    headers.set("Accept", "*/*");
    headers.set("Connection", "close");
    if let Some(body) = &body {
        headers.set("Content-Length", body.len().to_string());
    }
    for (name, value) in extra_headers {
        headers.set(name.clone(), value.clone());
    }

    let mut aggregate = AggregateBucket::new();
    aggregate.append(SimpleBucket::new(Bytes::from(request_line.into_bytes())));
    aggregate.append(headers.into_bucket());
    if let Some(body) = body {
        aggregate.append(SimpleBucket::new(body));
    }
    aggregate
}

/// Parses a `Name: Value` header argument from the command line (§4.10).
pub fn parse_header(raw: &str) -> Result<(String, String), crate::error::Error> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| crate::error::Error::MalformedHeader(raw.to_string()))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::{Bucket, ReadStatus};

    fn drain(bucket: &mut impl Bucket) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let (view, status) = bucket.read(None);
            out.extend_from_slice(&view);
            if status != ReadStatus::MoreAvailable {
                break;
            }
        }
        out
    }

    #[test]
    fn builds_a_get_request_with_host_header() {
        let url = Url::parse("http://example.com/path?q=1").unwrap();
        let mut req = build("GET", &url, &[], None);
        let bytes = drain(&mut req);
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("GET /path?q=1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn root_path_defaults_to_slash() {
        let url = Url::parse("http://example.com").unwrap();
        let req = build("GET", &url, &[], None);
        assert!(!req.is_empty());
    }

    #[test]
    fn includes_content_length_and_body_when_present() {
        let url = Url::parse("http://example.com/submit").unwrap();
        let mut req = build("POST", &url, &[], Some(Bytes::from_static(b"hello")));
        let bytes = drain(&mut req);
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn parses_well_formed_header_argument() {
        let (name, value) = parse_header("X-Test:  value ").unwrap();
        assert_eq!(name, "X-Test");
        assert_eq!(value, "value");
    }

    #[test]
    fn rejects_header_argument_without_colon() {
        assert!(parse_header("not-a-header").is_err());
    }
}
