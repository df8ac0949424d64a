#![cfg(feature = "test-harness")]

use redpipe::test_support::StubServer;
use redpipe::{Client, ClientConfig, Connection, RedisCommands};

fn config_for(server: &StubServer) -> ClientConfig {
    ClientConfig {
        host: Some(server.host()),
        port: Some(server.port()),
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn s1_set_get_del_exists() {
    let server = StubServer::spawn().await;
    let conn = Connection::connect(&config_for(&server)).await.unwrap();

    assert_eq!(conn.set(b"xyz", b"test").await.unwrap(), "OK".into());
    assert_eq!(conn.get(b"xyz").await.unwrap().as_bulk().unwrap(), "test".as_bytes());
    assert_eq!(conn.del(&[b"xyz"]).await.unwrap(), redpipe::Value::Integer(1));
    assert_eq!(conn.exists(b"xyz").await.unwrap(), redpipe::Value::Integer(0));
}

#[tokio::test]
async fn s2_list_push_pop_len() {
    let server = StubServer::spawn().await;
    let conn = Connection::connect(&config_for(&server)).await.unwrap();

    assert_eq!(conn.lpush(b"L", &[b"a"]).await.unwrap(), redpipe::Value::Integer(1));
    assert_eq!(conn.llen(b"L").await.unwrap(), redpipe::Value::Integer(1));
    assert_eq!(conn.rpop(b"L").await.unwrap().as_bulk().unwrap(), "a".as_bytes());
    assert_eq!(conn.llen(b"L").await.unwrap(), redpipe::Value::Integer(0));
}

#[tokio::test]
async fn s3_pubsub_delivers_and_gates_resp2() {
    let server = StubServer::spawn().await;
    let publisher = Connection::connect(&config_for(&server)).await.unwrap();
    let subscriber = Connection::connect(&config_for(&server)).await.unwrap();

    let mut subs = subscriber
        .subscribe(
            redpipe::SubscriptionKind::Channel,
            vec![bytes::Bytes::from_static(b"test::somewhere")],
        )
        .await
        .unwrap();
    let mut sub = subs.remove(0);

    publisher.publish(b"test::somewhere", b"hi").await.unwrap();
    let msg = sub.recv().await.expect("message delivered");
    assert_eq!(msg.channel.as_ref(), b"test::somewhere");
    assert_eq!(msg.payload.as_ref(), b"hi");

    let err = subscriber.get(b"foo").await.unwrap_err();
    assert_eq!(err.kind(), redpipe::ErrorKind::PubSubMode);
}

#[tokio::test]
async fn s4_multi_exec_resolves_in_order() {
    let server = StubServer::spawn().await;
    let conn = Connection::connect(&config_for(&server)).await.unwrap();
    let client = Client::Single {
        conn,
        tx_lock: Default::default(),
    };

    let results = client
        .multi(|body| {
            body.queue(&[b"INCR", b"k"])?;
            body.queue(&[b"INCR", b"k"])?;
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &redpipe::Value::Integer(1));
    assert_eq!(results[1].as_ref().unwrap(), &redpipe::Value::Integer(2));
}

#[cfg(feature = "cluster")]
#[tokio::test]
async fn s5_cluster_moved_repoints_permanently() {
    let host1 = StubServer::spawn().await;
    let host2 = StubServer::spawn().await;

    let key = b"{slot1234}a";
    host1.script_moved(key, &format!("127.0.0.1:{}", host2.port()));

    let router = redpipe::ClusterRouter::bootstrap(&config_for(&host1)).await.unwrap();

    let reply = router.execute(&[b"SET", key, b"v"]).await.unwrap();
    assert_eq!(reply, "OK".into());

    let reply = router.execute(&[b"SET", key, b"v2"]).await.unwrap();
    assert_eq!(reply, "OK".into());

    let host1_sets = host1
        .log
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.starts_with("SET"))
        .count();
    assert_eq!(host1_sets, 1, "only the first SET should ever reach host1");

    let host2_sets = host2
        .log
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.starts_with("SET"))
        .count();
    assert_eq!(host2_sets, 2, "both SETs should land on the redirect target");
}

#[tokio::test]
async fn on_disconnect_hook_fires_on_local_close() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let server = StubServer::spawn().await;
    let fired = Arc::new(AtomicBool::new(false));
    let fired_in_hook = fired.clone();
    let config = ClientConfig {
        on_disconnect: Some(redpipe::DisconnectHook::new(move |reason| {
            assert!(reason.to_string().contains("local shutdown"));
            fired_in_hook.store(true, Ordering::SeqCst);
        })),
        ..config_for(&server)
    };
    let conn = Connection::connect(&config).await.unwrap();
    conn.close();

    // The actor tears down asynchronously; poll briefly instead of
    // assuming a single yield is enough to observe it.
    for _ in 0..50 {
        if fired.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(fired.load(Ordering::SeqCst), "on_disconnect hook never fired");
}

#[test]
fn s6_resp2_distinguishes_null_array_and_null_bulk() {
    use redpipe::resp::RespCodec;
    use redpipe::Value;
    use tokio_util::codec::Decoder;

    let mut codec = RespCodec::default();
    let mut buf = bytes::BytesMut::from(&b"*-1\r\n"[..]);
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(Value::NullArray));

    let mut buf = bytes::BytesMut::from(&b"$-1\r\n"[..]);
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(Value::NullBulk));
}
