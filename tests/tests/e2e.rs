//! End-to-end scenarios: two clients of the same user against a shared
//! server, exercising push, pull, conflict and delete propagation over HTTP.

use {
    hoard::{crypto, remote::Remote, secret::Secret, Error},
    hoard_tests::{Policy, TestClient, TestServer, PASSPHRASE},
    tokio_util::sync::CancellationToken,
};

#[tokio::test]
async fn sync_lifecycle_between_two_clients() {
    let server = TestServer::spawn().await.unwrap();
    let cancel = CancellationToken::new();

    let a = TestClient::new(&server, "alice", "pw").unwrap();
    let b = TestClient::new(&server, "alice", "pw").unwrap();
    a.remote().unwrap().signup(&cancel).await.unwrap();

    // client A creates a secret and pushes it
    let vault_a = a.vault(None).await.unwrap();
    vault_a
        .create(&cancel, "note1", &Secret::text("secret"))
        .await
        .unwrap();
    vault_a.sync_all(&cancel).await.unwrap();

    let listed = a.remote().unwrap().list(&cancel).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "note1");
    let uploaded = a.remote().unwrap().get(&cancel, "note1").await.unwrap();
    assert_eq!(uploaded.hash, listed[0].hash);
    // the server-side blob decrypts with the shared passphrase
    let decrypted = Secret::decode(&crypto::decrypt(&uploaded, PASSPHRASE).unwrap()).unwrap();
    assert_eq!(decrypted, Secret::text("secret"));

    // a fresh client of the same user pulls it
    let vault_b = b.vault(None).await.unwrap();
    vault_b.sync_all(&cancel).await.unwrap();
    assert_eq!(
        vault_b.read(&cancel, "note1").await.unwrap(),
        Secret::text("secret")
    );

    // B rewrites the secret from scratch; the divergent edit conflicts
    vault_b.delete(&cancel, "note1").await.unwrap();
    vault_b
        .create(&cancel, "note1", &Secret::text("rewritten"))
        .await
        .unwrap();
    let err = vault_b.sync_all(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Conflict));
    // no state change on either side
    let remote_blob = b.remote().unwrap().get(&cancel, "note1").await.unwrap();
    assert_eq!(remote_blob.hash, uploaded.hash);
    assert_eq!(
        vault_b.read(&cancel, "note1").await.unwrap(),
        Secret::text("rewritten")
    );
    vault_b.close().await;

    // retried with --prefer local, B's version wins everywhere
    let vault_b = b.vault(Some(Policy::Local)).await.unwrap();
    vault_b.sync_all(&cancel).await.unwrap();
    let remote_blob = b.remote().unwrap().get(&cancel, "note1").await.unwrap();
    let decrypted = Secret::decode(&crypto::decrypt(&remote_blob, PASSPHRASE).unwrap()).unwrap();
    assert_eq!(decrypted, Secret::text("rewritten"));
    vault_a.sync_all(&cancel).await.unwrap();
    assert_eq!(
        vault_a.read(&cancel, "note1").await.unwrap(),
        Secret::text("rewritten")
    );

    // A deletes; the delete propagates through the server to B
    vault_a.delete(&cancel, "note1").await.unwrap();
    vault_a.sync_all(&cancel).await.unwrap();
    vault_b.sync_all(&cancel).await.unwrap();

    assert!(a.remote().unwrap().list(&cancel).await.unwrap().is_empty());
    assert!(matches!(
        vault_a.read(&cancel, "note1").await,
        Err(Error::NotFound)
    ));
    assert!(matches!(
        vault_b.read(&cancel, "note1").await,
        Err(Error::NotFound)
    ));

    vault_a.close().await;
    vault_b.close().await;
}

#[tokio::test]
async fn repeated_sync_is_stable() {
    let server = TestServer::spawn().await.unwrap();
    let cancel = CancellationToken::new();

    let client = TestClient::new(&server, "carol", "pw").unwrap();
    client.remote().unwrap().signup(&cancel).await.unwrap();

    let vault = client.vault(None).await.unwrap();
    vault
        .create(&cancel, "payment", &Secret::card("4242", "12/30", "123", "carol"))
        .await
        .unwrap();
    vault.sync_all(&cancel).await.unwrap();

    let before = client.remote().unwrap().list(&cancel).await.unwrap();
    vault.sync_all(&cancel).await.unwrap();
    vault.sync_all(&cancel).await.unwrap();
    let after = client.remote().unwrap().list(&cancel).await.unwrap();

    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 1);
    assert_eq!(before[0].hash, after[0].hash);
    vault.close().await;
}

#[tokio::test]
async fn signup_twice_reports_already_exists() {
    let server = TestServer::spawn().await.unwrap();
    let cancel = CancellationToken::new();

    let client = TestClient::new(&server, "dave", "pw").unwrap();
    client.remote().unwrap().signup(&cancel).await.unwrap();
    let err = client.remote().unwrap().signup(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists));
}

#[tokio::test]
async fn wrong_password_is_unauthenticated() {
    let server = TestServer::spawn().await.unwrap();
    let cancel = CancellationToken::new();

    let good = TestClient::new(&server, "erin", "pw").unwrap();
    good.remote().unwrap().signup(&cancel).await.unwrap();

    let bad = TestClient::new(&server, "erin", "wrong").unwrap();
    let err = bad.remote().unwrap().list(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Unauthenticated));
}

#[tokio::test]
async fn users_do_not_see_each_other() {
    let server = TestServer::spawn().await.unwrap();
    let cancel = CancellationToken::new();

    let frank = TestClient::new(&server, "frank", "pw").unwrap();
    let grace = TestClient::new(&server, "grace", "pw").unwrap();
    frank.remote().unwrap().signup(&cancel).await.unwrap();
    grace.remote().unwrap().signup(&cancel).await.unwrap();

    let vault = frank.vault(None).await.unwrap();
    vault
        .create(&cancel, "only-franks", &Secret::text("hidden"))
        .await
        .unwrap();
    vault.sync_all(&cancel).await.unwrap();
    vault.close().await;

    assert!(grace.remote().unwrap().list(&cancel).await.unwrap().is_empty());
    assert!(matches!(
        grace.remote().unwrap().get(&cancel, "only-franks").await,
        Err(Error::NotFound)
    ));
}
