use cartpilot_core::testing::FakePage;
use cartpilot_core::{PageDriver, SitesFile};
use serde_json::json;

use super::*;
use crate::adapter::{AdapterSettings, StoreAdapter};

const TIMEOUT: Duration = Duration::from_millis(500);

fn channel() -> (PageChannel, mpsc::Receiver<PageCall>) {
    PageChannel::pair(4, Platform::Generic, TIMEOUT)
}

#[test]
fn requests_serialize_with_action_tag_and_ids() {
    let envelope = Envelope {
        id: 12,
        tab_id: 4,
        body: PageRequest::ExtractPageContent { max_products: 20 },
    };
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({"id": 12, "tabId": 4, "action": "EXTRACT_PAGE_CONTENT", "maxProducts": 20})
    );

    let parsed: Envelope<PageRequest> =
        serde_json::from_value(json!({"id": 3, "tabId": 4, "action": "CLICK_BUY_NOW"})).unwrap();
    assert_eq!(parsed.body, PageRequest::ClickBuyNow);
    assert_eq!(parsed.body.action(), "CLICK_BUY_NOW");
}

#[test]
fn search_request_defaults_filters_and_sort() {
    let parsed: PageRequest =
        serde_json::from_value(json!({"action": "SEARCH", "query": "phone"})).unwrap();
    assert_eq!(
        parsed,
        PageRequest::Search {
            query: "phone".into(),
            filters: BTreeMap::new(),
            sort: Sort::Relevance,
        }
    );
}

#[test]
fn responses_carry_body_next_to_status() {
    let failed = serde_json::to_value(PageResponse::failed("boom")).unwrap();
    assert_eq!(failed, json!({"success": false, "error": "boom"}));

    let details = PageResponse::ok(ReplyBody::Details {
        details: ProductDetails {
            title: "Galaxy M34".into(),
            price: "₹16,999".into(),
            url: "https://shop.test/product/1".into(),
        },
    });
    let value = serde_json::to_value(&details).unwrap();
    assert_eq!(value["success"], json!(true));
    assert_eq!(value["details"]["title"], json!("Galaxy M34"));

    let back: PageResponse = serde_json::from_value(value).unwrap();
    assert_eq!(back, details);

    let empty: PageResponse = serde_json::from_value(json!({"success": true})).unwrap();
    assert_eq!(empty.body, ReplyBody::Empty {});
}

#[tokio::test]
async fn second_request_is_rejected_while_first_is_pending() {
    let (channel, mut incoming) = channel();

    let responder = async {
        let call = incoming.recv().await.unwrap();
        assert_eq!(call.envelope.body, PageRequest::GetSearchResults);
        call.respond(PageResponse::ok(ReplyBody::Items { items: vec![] }));
    };
    let (first, second, ()) = tokio::join!(
        channel.request(PageRequest::GetSearchResults),
        channel.request(PageRequest::ClickBuyNow),
        responder,
    );

    assert!(first.unwrap().success);
    assert!(matches!(
        second,
        Err(ProtocolError::RequestInFlight { .. })
    ));
}

#[tokio::test]
async fn slot_is_released_after_reply() {
    let (channel, mut incoming) = channel();

    let responder = async {
        for _ in 0..2 {
            let call = incoming.recv().await.unwrap();
            call.respond(PageResponse::done(true));
        }
    };
    let requests = async {
        let a = channel.request(PageRequest::AddToCart).await.unwrap();
        let b = channel.request(PageRequest::ClickBuyNow).await.unwrap();
        (a, b)
    };
    let ((a, b), ()) = tokio::join!(requests, responder);

    assert!(a.success && b.success);
}

#[tokio::test]
async fn mismatched_reply_id_is_rejected() {
    let (channel, mut incoming) = channel();

    let responder = async {
        let call = incoming.recv().await.unwrap();
        let wrong = Envelope {
            id: call.envelope.id + 100,
            tab_id: call.envelope.tab_id,
            body: PageResponse::done(true),
        };
        call.respond_with(wrong);
    };
    let (result, ()) = tokio::join!(channel.request(PageRequest::AddToCart), responder);

    match result {
        Err(ProtocolError::CorrelationMismatch { expected, got }) => assert_eq!(got, expected + 100),
        other => panic!("expected a correlation mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn dropped_page_context_is_disconnected() {
    let (channel, incoming) = channel();
    drop(incoming);

    assert_eq!(
        channel.request(PageRequest::GetSearchResults).await,
        Err(ProtocolError::Disconnected)
    );
}

#[tokio::test]
async fn spawned_page_context_serves_adapter_calls() {
    let page = FakePage::new().with_page(
        "https://shop.test/search?q=phone",
        r#"<html><body>
          <div class="product-card"><h3>Galaxy M34 5G</h3><a href="/product/1">view</a></div>
        </body></html>"#,
    )
    .with_page(
        "https://shop.test/product/1",
        "<html><body><h1>Galaxy M34 5G</h1><span class=\"price\">₹16,999</span></body></html>",
    );
    page.navigate("https://shop.test/search?q=phone").await.unwrap();
    let profile = SitesFile::builtin()
        .unwrap()
        .profile(Platform::Generic)
        .unwrap()
        .clone();
    let adapter = Arc::new(StoreAdapter::new(page, profile, AdapterSettings::default()));
    let channel = PageChannel::spawn(adapter, 9, TIMEOUT);

    assert_eq!(channel.tab_id(), 9);
    assert_eq!(channel.platform(), Platform::Generic);

    let results = channel.search_results().await;
    assert_eq!(results.len(), 1);

    let err = channel.select_product(3).await.unwrap_err();
    assert!(matches!(
        err,
        AdapterError::Protocol(ProtocolError::Failed { ref action, .. }) if action == "SELECT_PRODUCT"
    ));

    let product = channel.select_product(0).await.unwrap();
    assert_eq!(product.title, "Galaxy M34 5G");
    let details = channel.product_details().await.unwrap();
    assert_eq!(details.price, "₹16,999");
    assert!(matches!(
        channel.buy_now().await,
        Err(AdapterError::Protocol(ProtocolError::Failed { .. }))
    ));
}
