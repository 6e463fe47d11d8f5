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

//! `bucketcat` is a thin command-line HTTP(S) fetcher (§4.10) that exercises
//! `bucket_core`/`bucket_tls` end to end: it builds request bytes with the
//! `Headers`/`Aggregate`/`Simple` buckets, drives them across a TCP (or,
//! with `bucket_tls`, TLS) connection, and parses the response back with
//! `ResponseBucket`. No connection pooling, retries, or redirects — those
//! belong to the dispatch layer the specification keeps out of scope.

mod error;
mod request;
mod transport;

use std::io::{self, Write};
use std::process;

use bucket_core::{Bucket, ReadStatus};
use clap::Parser;
use url::Url;

use error::{Error, Result};

/// Resolves one non-`Ok` outcome of a `ResponseBucket` phase-advancing call
/// (`status_line`/`wait_for_headers`, which return `ReadStatus` rather than
/// this crate's `Error`): a transient status just means "call again", a
/// terminal error propagates, and a clean end-of-stream before the header
/// block finished is itself a parse error.
fn wait_or_fail(status: ReadStatus) -> Result<()> {
    match status {
        ReadStatus::MoreAvailable | ReadStatus::WouldBlock => Ok(()),
        ReadStatus::EndOfStream => Err(Error::Response(bucket_core::ErrorStatus::ParseError)),
        ReadStatus::Error(e) => Err(Error::Response(e)),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Fetch a URL through the bucket pipeline", long_about = None)]
struct Args {
    /// The URL to fetch (http:// or https://).
    url: String,
    /// The HTTP method to use.
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// An extra request header in "Name: Value" form. May be given multiple times.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// A request body to send (implies Content-Length).
    #[arg(short, long)]
    data: Option<String>,
    /// Print the response status line and headers before the body.
    #[arg(short, long)]
    include: bool,
    /// Accept any TLS certificate, installing a certificate callback that
    /// unconditionally overrides verification failures (§4.8).
    #[arg(short = 'k', long)]
    insecure: bool,
}

fn logic() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let url = Url::parse(&args.url)?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::UnsupportedScheme(scheme.to_string()));
    }
    let host = url.host_str().ok_or(Error::MissingHost)?.to_string();
    let port = url
        .port_or_known_default()
        .expect("http/https always have a known default port");

    let mut extra_headers = Vec::with_capacity(args.headers.len());
    for raw in &args.headers {
        extra_headers.push(request::parse_header(raw)?);
    }
    let body = args.data.as_ref().map(|d| bytes::Bytes::from(d.clone().into_bytes()));

    let req = request::build(&args.method, &url, &extra_headers, body);

    let mut response = if scheme == "https" {
        transport::fetch_tls(&host, port, req, args.insecure)?
    } else {
        transport::fetch_plain(&host, port, req)?
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.include {
        let status_line = loop {
            match response.status_line() {
                Ok(sl) => break sl.clone(),
                Err(e) => wait_or_fail(e)?,
            }
        };
        writeln!(
            out,
            "HTTP/{}.{} {} {}",
            status_line.version.0, status_line.version.1, status_line.code, status_line.reason
        )?;
        loop {
            match response.wait_for_headers() {
                Ok(headers) => {
                    for (name, value) in headers.iter() {
                        writeln!(out, "{name}: {value}")?;
                    }
                    break;
                }
                Err(e) => wait_or_fail(e)?,
            }
        }
        writeln!(out)?;
    } else {
        // Still have to drive the machine through the header block before
        // the body substream exists (§4.6 "phase machine advances
        // monotonically").
        loop {
            match response.wait_for_headers() {
                Ok(_) => break,
                Err(e) => wait_or_fail(e)?,
            }
        }
    }

    loop {
        let (view, status) = response.read(None);
        if !view.is_empty() {
            out.write_all(&view)?;
        }
        match status {
            ReadStatus::MoreAvailable => continue,
            ReadStatus::EndOfStream => break,
            ReadStatus::WouldBlock => continue,
            ReadStatus::Error(e) => return Err(Error::Response(e)),
        }
    }

    Ok(())
}

fn main() {
    match logic() {
        Ok(()) => {}
        Err(e) => {
            eprintln!("bucketcat: {e}");
            process::exit(1);
        }
    }
}
