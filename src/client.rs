//! Client facade.
//!
//! [`Client`] ties the request builders, the failover loops and the reply parsers
//! together behind the daemon's commands. It owns its endpoints, the round-robin
//! cursor and any persistent session, so sharing one client between threads needs an
//! external lock.
//!
//! # Example
//! ```no_run
//! use searchd_client::{Client, ClientConfig, query::QueryBuilder};
//!
//! let config = ClientConfig::default().with_server("localhost:3312").unwrap();
//! let mut client = Client::new(config).unwrap();
//!
//! let query = QueryBuilder::new("hello").index("articles").build().unwrap();
//! match client.query(&query) {
//!     Ok(result) => println!("{} matches", result.total_found),
//!     Err(e) => eprintln!("search failed: {e} (connect error: {})", client.is_connect_error()),
//! }
//! ```
use log::{debug, warn};

use crate::{
    config::ClientConfig,
    endpoint::Endpoint,
    error::{Error, Result},
    failover::{Failover, RetryPolicy, ServerSelector, with_socket},
    protocol::{
        AttributeUpdate, ExcerptOptions, Keyword, Reply, Request, ResultSet, Status,
        request::{
            excerpts_request, flush_request, keywords_request, search_body, status_request,
            update_request,
        },
        response::{
            parse_excerpts, parse_flush, parse_keywords, parse_search, parse_status, parse_update,
        },
    },
    query::QueryDescriptor,
};

/// Status table of one endpoint, or why it could not be fetched.
#[derive(Debug)]
pub struct EndpointStatus {
    pub endpoint: String,
    pub result: Result<Vec<Vec<String>>>,
}

#[derive(Debug)]
pub struct Client {
    endpoints: Vec<Endpoint>,
    failover: Failover,
    queue: Vec<Vec<u8>>,
    error: String,
    warning: String,
    conn_error: bool,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            failover: Failover::new(RetryPolicy::from(&config)),
            endpoints: config.endpoints.into_iter().map(Endpoint::new).collect(),
            queue: Vec::new(),
            error: String::new(),
            warning: String::new(),
            conn_error: false,
        })
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn last_error(&self) -> &str {
        &self.error
    }

    pub fn last_warning(&self) -> &str {
        &self.warning
    }

    /// Whether the last failure was a connection failure rather than a daemon or
    /// protocol one.
    pub fn is_connect_error(&self) -> bool {
        self.conn_error
    }

    fn begin(&mut self) {
        self.error.clear();
        self.warning.clear();
        self.conn_error = false;
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.error = e.to_string();
            self.conn_error = e.is_connect_error();
        }
        result
    }

    /// Sends `request` through both retry loops and returns the interpreted reply.
    fn perform(&mut self, request: &Request, selector: ServerSelector) -> Result<Reply> {
        let policy = self.failover.policy();
        let result = self.failover.with_server(&mut self.endpoints, selector, |endpoint| {
            with_socket(endpoint, &policy, |session| {
                session.write_request(request)?;
                if !request.command.expects_reply() {
                    return Ok(Reply {
                        version: request.command.version(),
                        body: Vec::new(),
                        warning: None,
                    });
                }
                session.read_response(request.command.version())
            })
        });
        let reply = self.record(result)?;
        if let Some(warning) = &reply.warning {
            self.warning = warning.clone();
        }
        Ok(reply)
    }

    /// Runs a single search. Any queued queries are discarded first.
    ///
    /// A query the daemon rejected is reported as an error carrying its message. A query
    /// the daemon asked to retry still comes back as a result set, flagged by its status.
    pub fn query(&mut self, query: &QueryDescriptor) -> Result<ResultSet> {
        self.queue.clear();
        self.add_query(query);
        let mut results = self.run_queries()?;
        let result = results
            .pop()
            .ok_or_else(|| Error::Response("searchd returned no result block".into()))?;

        self.error = result.error.clone();
        self.warning = result.warning.clone();
        match result.status {
            Status::Error => Err(Error::Internal(result.error)),
            Status::Ok | Status::Warning | Status::Retry => Ok(result),
        }
    }

    /// Queues a search for the next [`run_queries`](Self::run_queries); returns its position.
    pub fn add_query(&mut self, query: &QueryDescriptor) -> usize {
        self.queue.push(search_body(query));
        self.queue.len() - 1
    }

    /// Sends every queued search in one request.
    ///
    /// Results come back in queue order, one per query; a query the daemon rejected
    /// is flagged on its own [`ResultSet`] and does not fail the batch.
    pub fn run_queries(&mut self) -> Result<Vec<ResultSet>> {
        self.begin();
        if self.queue.is_empty() {
            let err = Error::argument("No queries defined, issue add_query() first");
            return self.record(Err(err));
        }
        let queue = std::mem::take(&mut self.queue);
        let request = Request::batch(&queue);
        debug!("running {} queued queries", queue.len());

        let reply = self.perform(&request, ServerSelector::Seeded(request.checksum()))?;
        let parsed = parse_search(&reply.body, queue.len()).map_err(Error::from);
        let results = self.record(parsed)?;
        for result in results.iter().filter(|r| r.is_error()) {
            warn!("query failed: {}", result.error);
        }
        Ok(results)
    }

    /// Highlighted snippets, one per document, in order.
    pub fn build_excerpts<S: AsRef<str>>(
        &mut self,
        docs: &[S],
        index: &str,
        words: &str,
        opts: &ExcerptOptions,
    ) -> Result<Vec<String>> {
        self.begin();
        let request = excerpts_request(docs, index, words, opts);
        let reply = self.perform(&request, ServerSelector::RoundRobin)?;
        let parsed = parse_excerpts(&reply.body, docs.len()).map_err(Error::from);
        self.record(parsed)
    }

    /// Tokenized and normalized keywords of `query`, with per-keyword statistics when
    /// `hits` is set.
    pub fn build_keywords(&mut self, query: &str, index: &str, hits: bool) -> Result<Vec<Keyword>> {
        self.begin();
        let request = keywords_request(query, index, hits);
        let reply = self.perform(&request, ServerSelector::RoundRobin)?;
        let parsed = parse_keywords(&reply.body, hits).map_err(Error::from);
        self.record(parsed)
    }

    /// Number of documents updated, or -1 when the daemon refused the update.
    pub fn update_attributes(&mut self, index: &str, update: &AttributeUpdate) -> Result<i32> {
        self.begin();
        let request = update_request(index, update);
        let reply = self.perform(&request, ServerSelector::RoundRobin)?;
        let parsed = parse_update(&reply.body).map_err(Error::from);
        self.record(parsed)
    }

    /// Status table of every endpoint. One endpoint failing does not stop the others.
    pub fn status(&mut self) -> Vec<EndpointStatus> {
        self.begin();
        let request = status_request();
        let mut out = Vec::with_capacity(self.endpoints.len());
        for i in 0..self.endpoints.len() {
            let endpoint = self.endpoints[i].addr().to_string();
            let result = self
                .perform(&request, ServerSelector::Fixed(i))
                .and_then(|reply| parse_status(&reply.body).map_err(Error::from));
            let result = self.record(result);
            out.push(EndpointStatus { endpoint, result });
        }
        out
    }

    /// Forces the daemon to flush attribute updates to disk; returns the flush tag,
    /// or -1 when the daemon sent none.
    pub fn flush_attributes(&mut self) -> Result<i32> {
        self.begin();
        let request = flush_request();
        let reply = self.perform(&request, ServerSelector::RoundRobin)?;
        let parsed = parse_flush(&reply.body).map_err(Error::from);
        self.record(parsed)
    }

    fn single_endpoint(&mut self) -> Result<()> {
        if self.endpoints.len() > 1 {
            let err = Error::argument(
                "too many servers. persistent socket allowed only for a single server.",
            );
            return self.record(Err(err));
        }
        Ok(())
    }

    /// Opens a persistent session, reused by every call until [`close`](Self::close).
    pub fn open(&mut self) -> Result<()> {
        self.begin();
        self.single_endpoint()?;
        if self.endpoints[0].is_persistent() {
            return self.record(Err(Error::argument("already connected")));
        }
        let timeouts = self.failover.policy().timeouts;
        let result = self
            .failover
            .with_server(&mut self.endpoints, ServerSelector::Fixed(0), |endpoint| {
                endpoint.open_persistent(&timeouts)
            });
        self.record(result)
    }

    pub fn close(&mut self) -> Result<()> {
        self.begin();
        self.single_endpoint()?;
        let result = self.endpoints[0].close_persistent();
        self.record(result)
    }
}
