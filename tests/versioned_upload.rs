//!
//! Integration test for replacing a node with a new version (`ov`).
//!

use std::env;

use rand::distributions::{Alphanumeric, DistString};

#[tokio::test]
async fn versioned_upload_test() {
    let email = env::var("MEGA_EMAIL").expect("missing MEGA_EMAIL environment variable");
    let password = env::var("MEGA_PASSWORD").expect("missing MEGA_PASSWORD environment variable");

    let http_client = reqwest::Client::new();
    let mega = mega_fs::Client::builder().build(http_client).unwrap();

    mega.login(&email, &password, None)
        .await
        .expect("could not log in to MEGA");

    let nodes = mega
        .fetch_own_nodes()
        .await
        .expect("could not fetch own nodes");

    let root = nodes
        .cloud_drive()
        .expect("could not find Cloud Drive root");

    let mut rng = rand::thread_rng();
    let first = Alphanumeric.sample_string(&mut rng, 256);

    let h1 = mega
        .upload_node(
            root,
            "versioned-test-file.txt",
            first.len() as _,
            first.as_bytes(),
        )
        .await
        .expect("could not upload first version");

    let nodes = mega
        .fetch_own_nodes()
        .await
        .expect("could not fetch own nodes (after first upload)");

    let previous = nodes
        .get_node_by_hash(&h1)
        .expect("could not find first version by handle");

    let second = Alphanumeric.sample_string(&mut rng, 256);

    let h2 = mega
        .replace_node(
            root,
            previous,
            "versioned-test-file.txt",
            second.len() as _,
            second.as_bytes(),
        )
        .await
        .expect("could not upload second version");

    assert_ne!(h1, h2, "a replaced node must get a new handle");

    let nodes = mega
        .fetch_own_nodes()
        .await
        .expect("could not fetch own nodes (after second upload)");

    let current = nodes
        .get_node_by_path("/Root/versioned-test-file.txt")
        .expect("could not find current version by path");
    assert_eq!(current.hash(), h2);

    let mut downloaded = Vec::default();
    mega.download_node(current, &mut downloaded)
        .await
        .expect("could not download current version");
    assert_eq!(second.as_bytes(), downloaded.as_slice());

    mega.delete_node(current)
        .await
        .expect("could not delete test file");

    mega.logout().await.expect("could not log out from MEGA");
}
