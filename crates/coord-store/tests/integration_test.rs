mod common;

use chrono::Utc;
use coord_store::node::NewNode;
use coord_store::models::RegistrationMethod;

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn register_allocates_unique_addresses_in_namespace() {
    let pool = common::create_test_pool().await;
    common::cleanup_test_db(&pool).await;

    let store = coord_store::Store::new(pool);
    let ns = store.namespaces.create("alice").await.unwrap();

    let v4: ipnet::IpNet = "100.64.0.0/24".parse().unwrap();
    let v6: ipnet::IpNet = "fd7a:115c:a1e0::/48".parse().unwrap();

    let first = store
        .nodes
        .create(
            NewNode {
                machine_key: "mkey:aaa",
                node_key: "nkey:aaa",
                namespace_id: ns.id,
                hostname: "laptop",
                given_name: "laptop",
                registration_method: RegistrationMethod::Interactive,
                pre_auth_key_id: None,
                expires_at: None,
            },
            &v4,
            &v6,
        )
        .await
        .unwrap();

    let second = store
        .nodes
        .create(
            NewNode {
                machine_key: "mkey:bbb",
                node_key: "nkey:bbb",
                namespace_id: ns.id,
                hostname: "desktop",
                given_name: "desktop",
                registration_method: RegistrationMethod::Interactive,
                pre_auth_key_id: None,
                expires_at: None,
            },
            &v4,
            &v6,
        )
        .await
        .unwrap();

    assert_ne!(first.ipv4, second.ipv4);
    assert_ne!(first.ipv6, second.ipv6);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn duplicate_hostname_in_namespace_is_rejected() {
    let pool = common::create_test_pool().await;
    common::cleanup_test_db(&pool).await;
    let store = coord_store::Store::new(pool);
    let ns = store.namespaces.create("bob").await.unwrap();
    let v4: ipnet::IpNet = "100.64.0.0/24".parse().unwrap();
    let v6: ipnet::IpNet = "fd7a:115c:a1e0::/48".parse().unwrap();

    let new = |mk: &'static str| NewNode {
        machine_key: mk,
        node_key: mk,
        namespace_id: ns.id,
        hostname: "dup",
        given_name: "dup",
        registration_method: RegistrationMethod::Interactive,
        pre_auth_key_id: None,
        expires_at: None,
    };

    store.nodes.create(new("mkey:1"), &v4, &v6).await.unwrap();
    let result = store.nodes.create(new("mkey:2"), &v4, &v6).await;
    assert!(result.is_err());
}

#[test]
fn pre_auth_key_expiration_is_enforced_without_a_database() {
    use coord_store::models::PreAuthKey;
    use uuid::Uuid;

    let key = PreAuthKey {
        id: Uuid::new_v4(),
        key_secret: "deadbeef".into(),
        namespace_id: Uuid::new_v4(),
        reusable: false,
        ephemeral: false,
        used: false,
        expiration: Some(Utc::now() - chrono::Duration::seconds(1)),
        created_at: Utc::now(),
    };
    assert!(!key.is_usable(Utc::now()));
}
