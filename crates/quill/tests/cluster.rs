//! End-to-end scenarios over a loopback cluster.

mod common;

use common::Cluster;
use quill::msg::{AccessMask, Status};

#[tokio::test(flavor = "multi_thread")]
async fn create_write_read_cycle() {
    let cluster = Cluster::start(2).await;
    let mut alice = cluster.client("alice").await;

    alice.create("doc.txt").await.unwrap();
    assert_eq!(alice.read("doc.txt").await.unwrap(), "");

    alice
        .replace_sentence("doc.txt", 0, "Hello world. Second sentence!")
        .await
        .unwrap();
    assert_eq!(
        alice.read("doc.txt").await.unwrap(),
        "Hello world. Second sentence!"
    );

    alice
        .replace_sentence("doc.txt", 1, "Better sentence!")
        .await
        .unwrap();
    assert_eq!(
        alice.read("doc.txt").await.unwrap(),
        "Hello world. Better sentence!"
    );

    // appending past the end is only possible on an empty document
    let err = alice
        .replace_sentence("doc.txt", 5, "Out of range.")
        .await
        .unwrap_err();
    assert!(matches!(err, quill::Error::InvalidState(_)));

    let info = alice.info("doc.txt").await.unwrap();
    assert!(info.starts_with("Words: 4 |"), "{info}");
}

#[tokio::test(flavor = "multi_thread")]
async fn access_grants_gate_reads_and_writes() {
    let cluster = Cluster::start(2).await;
    let mut alice = cluster.client("alice").await;
    let mut bob = cluster.client("bob").await;

    alice.create("doc.txt").await.unwrap();
    alice
        .replace_sentence("doc.txt", 0, "Shared text.")
        .await
        .unwrap();

    let err = bob.read("doc.txt").await.unwrap_err();
    assert_eq!(err.remote_status(), Some(Status::PermissionDenied));

    alice
        .add_access("doc.txt", "bob", AccessMask::read_only())
        .await
        .unwrap();
    assert_eq!(bob.read("doc.txt").await.unwrap(), "Shared text.");

    let err = bob
        .replace_sentence("doc.txt", 0, "Overwritten.")
        .await
        .unwrap_err();
    assert_eq!(err.remote_status(), Some(Status::PermissionDenied));

    alice
        .add_access("doc.txt", "bob", AccessMask::read_write())
        .await
        .unwrap();
    bob.replace_sentence("doc.txt", 0, "Overwritten.")
        .await
        .unwrap();
    assert_eq!(alice.read("doc.txt").await.unwrap(), "Overwritten.");

    alice.remove_access("doc.txt", "bob").await.unwrap();
    let err = bob.read("doc.txt").await.unwrap_err();
    assert_eq!(err.remote_status(), Some(Status::PermissionDenied));
}

#[tokio::test(flavor = "multi_thread")]
async fn granting_to_an_unregistered_user_fails() {
    let cluster = Cluster::start(1).await;
    let mut alice = cluster.client("alice").await;
    alice.create("doc.txt").await.unwrap();

    let err = alice
        .add_access("doc.txt", "dave", AccessMask::write_only())
        .await
        .unwrap_err();
    assert_eq!(err.remote_status(), Some(Status::UserNotFound));

    // registration is just connecting
    let _dave = cluster.client("dave").await;
    alice
        .add_access("doc.txt", "dave", AccessMask::write_only())
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_removes_grants_and_listings() {
    let cluster = Cluster::start(2).await;
    let mut alice = cluster.client("alice").await;
    let mut bob = cluster.client("bob").await;

    alice.create("doc.txt").await.unwrap();
    alice
        .add_access("doc.txt", "bob", AccessMask::read_only())
        .await
        .unwrap();
    assert!(bob.view("").await.unwrap().contains("doc.txt"));

    let err = bob.delete("doc.txt").await.unwrap_err();
    assert_eq!(err.remote_status(), Some(Status::NotOwner));

    alice.delete("doc.txt").await.unwrap();
    assert!(!bob.view("").await.unwrap().contains("doc.txt"));
    let err = bob.read("doc.txt").await.unwrap_err();
    assert_eq!(err.remote_status(), Some(Status::FileNotFound));

    // the name is free again
    alice.create("doc.txt").await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn placement_lands_on_a_fresh_node_and_survives_a_dead_one() {
    let mut cluster = Cluster::start(1).await;
    let mut alice = cluster.client("alice").await;
    for name in ["a", "b", "c"] {
        alice.create(name).await.unwrap();
    }

    assert_eq!(cluster.add_node().await, 2);
    alice.create("d").await.unwrap();
    alice.replace_sentence("d", 0, "On the new node.").await.unwrap();

    // d's primary is node 2 and its replica node 1; killing node 1 leaves
    // d fully readable and a (no replica) unreachable.
    cluster.kill_node(0).await;
    assert_eq!(alice.read("d").await.unwrap(), "On the new node.");
    let err = alice.read("a").await.unwrap_err();
    assert_eq!(err.remote_status(), Some(Status::ConnectionFailed));
}

#[tokio::test(flavor = "multi_thread")]
async fn replica_serves_reads_when_primary_is_unreachable() {
    let mut cluster = Cluster::start(2).await;
    let mut alice = cluster.client("alice").await;

    alice.create("doc.txt").await.unwrap();
    // the committed write replicates best-effort to the replica
    alice
        .replace_sentence("doc.txt", 0, "Durable enough.")
        .await
        .unwrap();

    cluster.kill_node(0).await;
    assert_eq!(alice.read("doc.txt").await.unwrap(), "Durable enough.");
}

#[tokio::test(flavor = "multi_thread")]
async fn undo_and_checkpoints_round_trip() {
    let cluster = Cluster::start(2).await;
    let mut alice = cluster.client("alice").await;

    alice.create("doc.txt").await.unwrap();
    alice
        .replace_sentence("doc.txt", 0, "Version one.")
        .await
        .unwrap();
    alice.checkpoint("doc.txt", "v1").await.unwrap();

    alice
        .replace_sentence("doc.txt", 0, "Version two.")
        .await
        .unwrap();
    assert_eq!(alice.read("doc.txt").await.unwrap(), "Version two.");

    alice.undo("doc.txt").await.unwrap();
    assert_eq!(alice.read("doc.txt").await.unwrap(), "Version one.");

    alice
        .replace_sentence("doc.txt", 0, "Version three.")
        .await
        .unwrap();
    assert!(alice.list_checkpoints("doc.txt").await.unwrap().contains("v1"));

    alice.revert("doc.txt", "v1").await.unwrap();
    assert_eq!(alice.read("doc.txt").await.unwrap(), "Version one.");

    let err = alice.revert("doc.txt", "nope").await.unwrap_err();
    assert_eq!(err.remote_status(), Some(Status::CheckpointNotFound));
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_delivers_words_in_order() {
    let cluster = Cluster::start(1).await;
    let mut alice = cluster.client("alice").await;

    alice.create("doc.txt").await.unwrap();
    alice
        .replace_sentence("doc.txt", 0, "Hello brave new world. Second sentence!")
        .await
        .unwrap();

    let mut words = Vec::new();
    alice
        .stream("doc.txt", |word| words.push(word.to_string()))
        .await
        .unwrap();
    assert_eq!(
        words,
        vec!["Hello", "brave", "new", "world.", "Second", "sentence!"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn folders_and_request_flow() {
    let cluster = Cluster::start(1).await;
    let mut alice = cluster.client("alice").await;
    let mut bob = cluster.client("bob").await;

    let ack = alice.create_folder("notes").await.unwrap();
    assert_eq!(ack, "Folder created: notes");
    assert!(alice.view("").await.unwrap().contains("[DIR] notes"));

    alice.create("doc.txt").await.unwrap();
    bob.request_access("doc.txt", AccessMask::write_only())
        .await
        .unwrap();
    let pending = alice.view_requests().await.unwrap();
    assert!(pending.contains("bob requests WRITE access to doc.txt"));

    alice.approve_access("doc.txt", "bob").await.unwrap();
    // approval is record keeping, not a grant
    let err = bob.read("doc.txt").await.unwrap_err();
    assert_eq!(err.remote_status(), Some(Status::PermissionDenied));
    assert!(!alice.view_requests().await.unwrap().contains("bob requests"));
}
