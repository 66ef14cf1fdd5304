//! Request/response messaging between the orchestrator and the page context.
//!
//! The page context owns the adapter and runs as its own task. Every request
//! carries a correlation id; a reply with a different id is rejected, and only
//! one request per tab may be outstanding at a time. Failures come back as
//! `success: false` with an `error` string rather than crossing the boundary
//! as errors.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cartpilot_core::{FilterKey, FilterValue, PageSnapshot, Platform, Product, ProductDetails, Sort};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::adapter::PlatformAdapter;
use crate::error::{AdapterError, ProtocolError};

/// Requests are queued behind this many others at most.
const MAILBOX_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageRequest {
    Search {
        query: String,
        #[serde(default)]
        filters: BTreeMap<FilterKey, FilterValue>,
        #[serde(default)]
        sort: Sort,
    },
    GetSearchResults,
    ApplyFilters {
        filters: BTreeMap<FilterKey, FilterValue>,
    },
    SelectProduct {
        index: usize,
    },
    ClickBuyNow,
    AddToCart,
    GetProductDetails,
    ExtractPageContent {
        #[serde(rename = "maxProducts")]
        max_products: usize,
    },
    Click {
        selector: String,
    },
    Input {
        selector: String,
        value: String,
    },
}

impl PageRequest {
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            PageRequest::Search { .. } => "SEARCH",
            PageRequest::GetSearchResults => "GET_SEARCH_RESULTS",
            PageRequest::ApplyFilters { .. } => "APPLY_FILTERS",
            PageRequest::SelectProduct { .. } => "SELECT_PRODUCT",
            PageRequest::ClickBuyNow => "CLICK_BUY_NOW",
            PageRequest::AddToCart => "ADD_TO_CART",
            PageRequest::GetProductDetails => "GET_PRODUCT_DETAILS",
            PageRequest::ExtractPageContent { .. } => "EXTRACT_PAGE_CONTENT",
            PageRequest::Click { .. } => "CLICK",
            PageRequest::Input { .. } => "INPUT",
        }
    }
}

/// Reply payload. Which field is present depends on the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Items { items: Vec<Product> },
    Product { product: Product },
    Details { details: ProductDetails },
    Content { content: PageSnapshot },
    Empty {},
}

impl ReplyBody {
    fn kind(&self) -> &'static str {
        match self {
            ReplyBody::Items { .. } => "items",
            ReplyBody::Product { .. } => "product",
            ReplyBody::Details { .. } => "details",
            ReplyBody::Content { .. } => "content",
            ReplyBody::Empty {} => "empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub body: ReplyBody,
}

impl PageResponse {
    #[must_use]
    pub fn ok(body: ReplyBody) -> Self {
        Self {
            success: true,
            error: None,
            body,
        }
    }

    #[must_use]
    pub fn done(success: bool) -> Self {
        Self {
            success,
            error: None,
            body: ReplyBody::Empty {},
        }
    }

    #[must_use]
    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            body: ReplyBody::Empty {},
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub id: u64,
    pub tab_id: u64,
    #[serde(flatten)]
    pub body: T,
}

/// One request as seen by the page context, with its reply slot.
#[derive(Debug)]
pub struct PageCall {
    pub envelope: Envelope<PageRequest>,
    reply: oneshot::Sender<Envelope<PageResponse>>,
}

impl PageCall {
    /// Sends `response` back under this call's correlation id.
    pub fn respond(self, response: PageResponse) {
        let envelope = Envelope {
            id: self.envelope.id,
            tab_id: self.envelope.tab_id,
            body: response,
        };
        self.respond_with(envelope);
    }

    /// Sends a fully formed envelope back, whatever id it carries.
    pub fn respond_with(self, envelope: Envelope<PageResponse>) {
        if self.reply.send(envelope).is_err() {
            tracing::debug!(id = self.envelope.id, "requester went away before the reply");
        }
    }
}

/// Releases the in-flight slot when the request finishes or is dropped.
struct InFlight<'a> {
    slot: &'a Mutex<Option<u64>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }
}

/// The orchestrator's end of a tab's message channel.
pub struct PageChannel {
    tab_id: u64,
    platform: Platform,
    timeout: Duration,
    next_id: AtomicU64,
    in_flight: Mutex<Option<u64>>,
    mailbox: mpsc::Sender<PageCall>,
}

impl PageChannel {
    /// A channel and the receiving end the page context reads from.
    #[must_use]
    pub fn pair(tab_id: u64, platform: Platform, timeout: Duration) -> (Self, mpsc::Receiver<PageCall>) {
        let (mailbox, incoming) = mpsc::channel(MAILBOX_CAPACITY);
        let channel = Self {
            tab_id,
            platform,
            timeout,
            next_id: AtomicU64::new(1),
            in_flight: Mutex::new(None),
            mailbox,
        };
        (channel, incoming)
    }

    /// Spawns a page context serving `adapter` and returns its channel.
    pub fn spawn<A>(adapter: Arc<A>, tab_id: u64, timeout: Duration) -> Self
    where
        A: PlatformAdapter + 'static,
    {
        let (channel, incoming) = Self::pair(tab_id, adapter.platform(), timeout);
        tokio::spawn(async move { serve(adapter.as_ref(), incoming).await });
        channel
    }

    #[must_use]
    pub fn tab_id(&self) -> u64 {
        self.tab_id
    }

    fn claim(&self, id: u64) -> Result<InFlight<'_>, ProtocolError> {
        let mut slot = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(in_flight) = *slot {
            return Err(ProtocolError::RequestInFlight { in_flight });
        }
        *slot = Some(id);
        Ok(InFlight {
            slot: &self.in_flight,
        })
    }

    /// Sends `request` and waits for its reply.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::RequestInFlight`] if another request is outstanding,
    /// [`ProtocolError::CorrelationMismatch`] if the reply carries another id,
    /// [`ProtocolError::Timeout`] or [`ProtocolError::Disconnected`] when no
    /// reply arrives.
    pub async fn request(&self, request: PageRequest) -> Result<PageResponse, ProtocolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _guard = self.claim(id)?;
        let action = request.action();
        let (reply, response) = oneshot::channel();
        let call = PageCall {
            envelope: Envelope {
                id,
                tab_id: self.tab_id,
                body: request,
            },
            reply,
        };
        tracing::debug!(id, tab_id = self.tab_id, action, "page request");
        self.mailbox
            .send(call)
            .await
            .map_err(|_| ProtocolError::Disconnected)?;

        let envelope = match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(_)) => return Err(ProtocolError::Disconnected),
            Err(_) => {
                return Err(ProtocolError::Timeout {
                    action: action.to_owned(),
                    ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };
        if envelope.id != id || envelope.tab_id != self.tab_id {
            tracing::warn!(expected = id, got = envelope.id, "discarding reply for another request");
            return Err(ProtocolError::CorrelationMismatch {
                expected: id,
                got: envelope.id,
            });
        }
        Ok(envelope.body)
    }

    /// Like [`PageChannel::request`], but turns `success: false` into an
    /// error.
    async fn call(&self, request: PageRequest) -> Result<ReplyBody, ProtocolError> {
        let action = request.action();
        let response = self.request(request).await?;
        if response.success {
            Ok(response.body)
        } else {
            Err(ProtocolError::Failed {
                action: action.to_owned(),
                message: response.error.unwrap_or_default(),
            })
        }
    }

    async fn call_flag(&self, request: PageRequest) -> bool {
        let action = request.action();
        match self.request(request).await {
            Ok(response) => response.success,
            Err(err) => {
                tracing::warn!(action, error = %err, "page request failed");
                false
            }
        }
    }

    async fn call_unit(&self, request: PageRequest) -> Result<(), AdapterError> {
        self.call(request).await?;
        Ok(())
    }
}

fn unexpected(action: &str, body: &ReplyBody) -> AdapterError {
    ProtocolError::UnexpectedReply {
        action: action.to_owned(),
        got: body.kind().to_owned(),
    }
    .into()
}

#[async_trait]
impl PlatformAdapter for PageChannel {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn search(&self, query: &str, filters: &BTreeMap<FilterKey, FilterValue>, sort: Sort) -> bool {
        self.call_flag(PageRequest::Search {
            query: query.to_owned(),
            filters: filters.clone(),
            sort,
        })
        .await
    }

    async fn search_results(&self) -> Vec<Product> {
        match self.call(PageRequest::GetSearchResults).await {
            Ok(ReplyBody::Items { items }) => items,
            Ok(other) => {
                tracing::warn!(got = other.kind(), "unexpected reply to GET_SEARCH_RESULTS");
                Vec::new()
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not fetch search results");
                Vec::new()
            }
        }
    }

    async fn apply_filters(&self, filters: &BTreeMap<FilterKey, FilterValue>) -> bool {
        self.call_flag(PageRequest::ApplyFilters {
            filters: filters.clone(),
        })
        .await
    }

    async fn select_product(&self, index: usize) -> Result<Product, AdapterError> {
        match self.call(PageRequest::SelectProduct { index }).await? {
            ReplyBody::Product { product } => Ok(product),
            other => Err(unexpected("SELECT_PRODUCT", &other)),
        }
    }

    async fn add_to_cart(&self) -> Result<(), AdapterError> {
        self.call_unit(PageRequest::AddToCart).await
    }

    async fn buy_now(&self) -> Result<(), AdapterError> {
        self.call_unit(PageRequest::ClickBuyNow).await
    }

    async fn product_details(&self) -> Result<ProductDetails, AdapterError> {
        match self.call(PageRequest::GetProductDetails).await? {
            ReplyBody::Details { details } => Ok(details),
            other => Err(unexpected("GET_PRODUCT_DETAILS", &other)),
        }
    }

    async fn page_snapshot(&self, max_products: usize) -> Result<PageSnapshot, AdapterError> {
        match self.call(PageRequest::ExtractPageContent { max_products }).await? {
            ReplyBody::Content { content } => Ok(content),
            other => Err(unexpected("EXTRACT_PAGE_CONTENT", &other)),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), AdapterError> {
        self.call_unit(PageRequest::Click {
            selector: selector.to_owned(),
        })
        .await
    }

    async fn input(&self, selector: &str, value: &str) -> Result<(), AdapterError> {
        self.call_unit(PageRequest::Input {
            selector: selector.to_owned(),
            value: value.to_owned(),
        })
        .await
    }
}

fn unit_reply(result: Result<(), AdapterError>) -> PageResponse {
    match result {
        Ok(()) => PageResponse::done(true),
        Err(err) => PageResponse::failed(err),
    }
}

/// Runs one request against `adapter`.
pub async fn handle<A>(adapter: &A, request: PageRequest) -> PageResponse
where
    A: PlatformAdapter + ?Sized,
{
    match request {
        PageRequest::Search { query, filters, sort } => {
            PageResponse::done(adapter.search(&query, &filters, sort).await)
        }
        PageRequest::GetSearchResults => PageResponse::ok(ReplyBody::Items {
            items: adapter.search_results().await,
        }),
        PageRequest::ApplyFilters { filters } => PageResponse::done(adapter.apply_filters(&filters).await),
        PageRequest::SelectProduct { index } => match adapter.select_product(index).await {
            Ok(product) => PageResponse::ok(ReplyBody::Product { product }),
            Err(err) => PageResponse::failed(err),
        },
        PageRequest::ClickBuyNow => unit_reply(adapter.buy_now().await),
        PageRequest::AddToCart => unit_reply(adapter.add_to_cart().await),
        PageRequest::GetProductDetails => match adapter.product_details().await {
            Ok(details) => PageResponse::ok(ReplyBody::Details { details }),
            Err(err) => PageResponse::failed(err),
        },
        PageRequest::ExtractPageContent { max_products } => match adapter.page_snapshot(max_products).await {
            Ok(content) => PageResponse::ok(ReplyBody::Content { content }),
            Err(err) => PageResponse::failed(err),
        },
        PageRequest::Click { selector } => unit_reply(adapter.click(&selector).await),
        PageRequest::Input { selector, value } => unit_reply(adapter.input(&selector, &value).await),
    }
}

/// Serves requests from `incoming` until every channel end is dropped.
pub async fn serve<A>(adapter: &A, mut incoming: mpsc::Receiver<PageCall>)
where
    A: PlatformAdapter + ?Sized,
{
    while let Some(call) = incoming.recv().await {
        let action = call.envelope.body.action();
        let response = handle(adapter, call.envelope.body.clone()).await;
        if let Some(error) = &response.error {
            tracing::debug!(action, error = %error, "page request failed");
        }
        call.respond(response);
    }
    tracing::debug!("page context stopped");
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
