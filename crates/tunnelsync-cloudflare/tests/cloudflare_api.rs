//! Cloudflare collaborators against a mock API server
//!
//! Verifies request shapes, response parsing and failure classification.
//! Retrying is not tested here: providers make exactly one request per call.

use serde_json::json;
use tunnelsync_cloudflare::{CloudflareClient, CloudflareDns, CloudflareTunnel};
use tunnelsync_core::model::{CurrentDnsRecord, DesiredRecord, IngressRule, RecordType, Zone};
use tunnelsync_core::{DnsProvider, Error, TunnelProvider};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn client(server: &MockServer, dry_run: bool) -> CloudflareClient {
    CloudflareClient::new(TOKEN, dry_run)
        .expect("client builds")
        .with_base_url(server.uri())
}

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result
    }))
}

fn zone() -> Zone {
    Zone {
        id: "zone-1".to_string(),
        name: "example.com".to_string(),
    }
}

#[tokio::test]
async fn list_zones_follows_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "result": [{ "id": "z1", "name": "example.com" }],
            "result_info": { "page": 1, "per_page": 1, "total_pages": 2, "count": 1, "total_count": 2 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "result": [{ "id": "z2", "name": "example.org" }],
            "result_info": { "page": 2, "per_page": 1, "total_pages": 2, "count": 1, "total_count": 2 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let zones = CloudflareDns::new(client(&server, false)).list_zones().await.unwrap();
    let names: Vec<_> = zones.iter().map(|z| z.name.as_str()).collect();
    assert_eq!(names, vec!["example.com", "example.org"]);
}

#[tokio::test]
async fn find_records_keeps_only_managed_types() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .and(query_param("name", "app.example.com"))
        .respond_with(ok(json!([
            { "id": "r1", "name": "app.example.com", "type": "TXT", "content": "hello", "proxied": false, "ttl": 1 },
            { "id": "r2", "name": "app.example.com", "type": "CNAME", "content": "abc123.cfargotunnel.com", "proxied": true, "ttl": 1 }
        ])))
        .mount(&server)
        .await;

    let records = CloudflareDns::new(client(&server, false))
        .find_records(&zone(), "app.example.com")
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "r2");
    assert_eq!(records[0].record_type, RecordType::Cname);
}

#[tokio::test]
async fn create_posts_desired_record() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/zones/zone-1/dns_records"))
        .and(body_json(json!({
            "type": "CNAME",
            "name": "pub.example.com",
            "content": "abc123.cfargotunnel.com",
            "proxied": true,
            "ttl": 1
        })))
        .respond_with(ok(json!({ "id": "new-record" })))
        .expect(1)
        .mount(&server)
        .await;

    CloudflareDns::new(client(&server, false))
        .create_record(&zone(), &DesiredRecord::tunnel("pub.example.com", "abc123"))
        .await
        .unwrap();
}

#[tokio::test]
async fn update_puts_to_existing_record_id() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/zones/zone-1/dns_records/r9"))
        .and(body_json(json!({
            "type": "A",
            "name": "home.example.com",
            "content": "192.168.1.10",
            "proxied": false,
            "ttl": 1
        })))
        .respond_with(ok(json!({ "id": "r9" })))
        .expect(1)
        .mount(&server)
        .await;

    let current = CurrentDnsRecord {
        id: "r9".to_string(),
        name: "home.example.com".to_string(),
        record_type: RecordType::Cname,
        content: "abc123.cfargotunnel.com".to_string(),
        proxied: true,
        ttl: Some(1),
    };
    CloudflareDns::new(client(&server, false))
        .update_record(&zone(), &current, &DesiredRecord::local("home.example.com", "192.168.1.10"))
        .await
        .unwrap();
}

#[tokio::test]
async fn dry_run_never_writes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/accounts/acct-1/cfd_tunnel/abc123/configurations"))
        .respond_with(ok(json!({ "tunnel_id": "abc123", "config": null })))
        .mount(&server)
        .await;

    let dry = client(&server, true);
    CloudflareDns::new(dry.clone())
        .create_record(&zone(), &DesiredRecord::tunnel("pub.example.com", "abc123"))
        .await
        .unwrap();
    CloudflareTunnel::new(dry, "abc123", Some("acct-1".to_string()))
        .put_ingress(&[IngressRule::catch_all("http_status:404")])
        .await
        .unwrap();
}

#[tokio::test]
async fn status_codes_are_classified() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 10000, "message": "Rate limited" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/zones/zone-1/dns_records/r1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 9005, "message": "Content for A record is invalid" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad gateway"))
        .mount(&server)
        .await;

    let dns = CloudflareDns::new(client(&server, false));
    let desired = DesiredRecord::local("home.example.com", "not-an-ip");

    let err = dns.create_record(&zone(), &desired).await.unwrap_err();
    assert!(err.is_transient(), "429 should be transient: {}", err);

    let current = CurrentDnsRecord {
        id: "r1".to_string(),
        name: "home.example.com".to_string(),
        record_type: RecordType::A,
        content: "10.0.0.1".to_string(),
        proxied: false,
        ttl: None,
    };
    match dns.update_record(&zone(), &current, &desired).await.unwrap_err() {
        Error::Rejected { status, message, .. } => {
            assert_eq!(status, Some(400));
            assert!(message.contains("Content for A record is invalid"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }

    assert!(dns.list_zones().await.unwrap_err().is_transient());
}

#[tokio::test]
async fn unsuccessful_envelope_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 1000, "message": "Invalid request" }],
            "result": null
        })))
        .mount(&server)
        .await;

    let err = CloudflareDns::new(client(&server, false)).list_zones().await.unwrap_err();
    assert!(matches!(err, Error::Rejected { .. }));
}

#[tokio::test]
async fn tunnel_ingress_round_trip() {
    let server = MockServer::start().await;
    let configurations = "/accounts/acct-1/cfd_tunnel/abc123/configurations";

    Mock::given(method("GET"))
        .and(path(configurations))
        .respond_with(ok(json!({
            "tunnel_id": "abc123",
            "version": 3,
            "config": {
                "ingress": [
                    {
                        "hostname": "pub.example.com",
                        "service": "http://192.168.1.10:8080",
                        "originRequest": { "noTLSVerify": true }
                    },
                    { "service": "http_status:404" }
                ],
                "originRequest": { "connectTimeout": 30 },
                "warp-routing": { "enabled": true }
            }
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(configurations))
        .and(body_json(json!({
            "config": {
                "ingress": [{ "service": "http_status:404" }],
                "originRequest": { "connectTimeout": 30 },
                "warp-routing": { "enabled": true }
            }
        })))
        .respond_with(ok(json!({ "tunnel_id": "abc123", "version": 4 })))
        .expect(1)
        .mount(&server)
        .await;

    let tunnel = CloudflareTunnel::new(client(&server, false), "abc123", Some("acct-1".to_string()));

    let ingress = tunnel.get_ingress().await.unwrap();
    assert_eq!(ingress.len(), 2);
    assert_eq!(ingress[0].hostname.as_deref(), Some("pub.example.com"));
    assert!(ingress[1].is_catch_all());

    tunnel
        .put_ingress(&[IngressRule::catch_all("http_status:404")])
        .await
        .unwrap();
}

#[tokio::test]
async fn account_is_discovered_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/accounts"))
        .respond_with(ok(json!([
            { "id": "acct-first", "name": "Primary" },
            { "id": "acct-second", "name": "Other" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/accounts/acct-first/cfd_tunnel/abc123/configurations"))
        .respond_with(ok(json!({ "tunnel_id": "abc123", "config": null })))
        .expect(2)
        .mount(&server)
        .await;

    let tunnel = CloudflareTunnel::new(client(&server, false), "abc123", None);
    assert!(tunnel.get_ingress().await.unwrap().is_empty());
    assert!(tunnel.get_ingress().await.unwrap().is_empty());
}
