//! Generate sample channel frames for companion-client interop testing.
//!
//! Run with: cargo run --package protocol --example test_vectors

use chrono::DateTime;
use protocol::messages::*;
use protocol::ServerIdentity;

fn main() {
    // Test vector 1: list-directory request
    let request = ChannelRequest {
        action: ActionKind::ListDirectory.as_str().to_string(),
        payload: serde_json::json!({ "path": "/photos" }),
    };
    print_test_vector("list_directory_request", &request);

    // Test vector 2: ping request
    let ping = ChannelRequest {
        action: ActionKind::Ping.as_str().to_string(),
        payload: serde_json::Value::Null,
    };
    print_test_vector("ping_request", &ping);

    // Test vector 3: successful listing
    let listing = DirectoryListing {
        current_path: "/photos".to_string(),
        entries: vec![DirectoryEntry {
            name: "beach.jpg".to_string(),
            logical_path: "/photos/beach.jpg".to_string(),
            kind: EntryKind::File,
            size_bytes: 204_800,
            modified_at: DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default(),
        }],
    };
    let success = ChannelResponse::success(
        ActionKind::ListDirectory.as_str(),
        serde_json::to_value(&listing).expect("listing serializes"),
    );
    print_test_vector("list_directory_success", &success);

    // Test vector 4: error frame
    let error = ChannelResponse::error(
        ActionKind::ListDirectory.as_str(),
        ErrorCode::NotFound,
        "path not found: /does-not-exist",
    );
    print_test_vector("list_directory_not_found", &error);

    // Test vector 5: pairing offer from a fresh identity
    let identity = ServerIdentity::generate().expect("identity generation");
    let offer = PairingOffer {
        host_name: "desktop".to_string(),
        server_public_key_export: identity.export_public_key().to_string(),
        fingerprint: identity.fingerprint(),
    };
    print_test_vector("pairing_offer", &offer);
}

fn print_test_vector<T: serde::Serialize>(name: &str, value: &T) {
    let json = serde_json::to_string_pretty(value).expect("vector serializes");
    println!("// {}", name);
    println!("{}", json);
    println!();
}
