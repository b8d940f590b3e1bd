//! End-to-end relay tests: the real router on an ephemeral port, driven by
//! plain WebSocket clients.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use dragonrock::{router, Registry, SharedRegistry};
use dragonrock_protocol::{
    CharAdd, Character, ClientMessage, DiceRoll, MusicAction, MusicControl, ServerMessage,
    StatePatch,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_TIMEOUT: Duration = Duration::from_millis(300);

async fn start_relay() -> String {
    let registry: SharedRegistry = Arc::new(Mutex::new(Registry::new()));
    let app = router(registry);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("ws://{addr}/ws")
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.expect("connect websocket");
    ws
}

async fn send(ws: &mut WsStream, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).expect("serialize client message");
    ws.send(Message::Text(json.into())).await.expect("send");
}

async fn recv_server_msg(ws: &mut WsStream) -> Option<ServerMessage> {
    while let Some(message) = ws.next().await {
        let Ok(message) = message else {
            continue;
        };
        match message {
            Message::Text(text) => {
                if let Ok(msg) = serde_json::from_str::<ServerMessage>(text.as_str()) {
                    return Some(msg);
                }
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn recv_with_timeout(ws: &mut WsStream, dur: Duration) -> Option<ServerMessage> {
    match timeout(dur, recv_server_msg(ws)).await {
        Ok(msg) => msg,
        Err(_) => None,
    }
}

/// Join a table and return the snapshot patch the relay replies with.
async fn join(ws: &mut WsStream, table_id: &str) -> StatePatch {
    send(
        ws,
        &ClientMessage::Join {
            table_id: table_id.to_string(),
        },
    )
    .await;
    match recv_with_timeout(ws, RECV_TIMEOUT).await {
        Some(ServerMessage::StatePatch {
            payload,
            origin_client_id: None,
        }) => payload,
        other => panic!("expected join snapshot, got {:?}", other),
    }
}

fn patch_msg(table_id: &str, payload: StatePatch, origin: &str) -> ClientMessage {
    ClientMessage::StatePatch {
        table_id: table_id.to_string(),
        payload,
        origin_client_id: Some(origin.to_string()),
    }
}

fn title_patch(title: &str) -> StatePatch {
    StatePatch {
        title: Some(title.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn join_receives_default_snapshot() {
    let url = start_relay().await;
    let mut ws = connect(&url).await;

    let snapshot = join(&mut ws, "table-1").await;
    assert_eq!(snapshot.title.as_deref(), Some("default"));
    assert_eq!(snapshot.edit_mode, Some(true));
    assert_eq!(snapshot.chars.map(|c| c.len()), Some(0));
}

#[tokio::test]
async fn patch_reaches_others_but_never_echoes_to_sender() {
    let url = start_relay().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;

    join(&mut a, "table-1").await;
    join(&mut b, "table-1").await;

    // a sees b's arrival
    match recv_with_timeout(&mut a, RECV_TIMEOUT).await {
        Some(ServerMessage::UserJoined { table_id, .. }) => assert_eq!(table_id, "table-1"),
        other => panic!("expected user:joined, got {:?}", other),
    }

    send(&mut a, &patch_msg("table-1", title_patch("X"), "origin-a")).await;

    match recv_with_timeout(&mut b, RECV_TIMEOUT).await {
        Some(ServerMessage::StatePatch {
            payload,
            origin_client_id,
        }) => {
            assert_eq!(payload.title.as_deref(), Some("X"));
            assert_eq!(origin_client_id.as_deref(), Some("origin-a"));
        }
        other => panic!("expected relayed state:patch, got {:?}", other),
    }

    // the sender gets no echo from the relay
    assert!(recv_with_timeout(&mut a, SILENCE_TIMEOUT).await.is_none());
}

#[tokio::test]
async fn disjoint_patches_accumulate_into_the_snapshot() {
    let url = start_relay().await;
    let mut a = connect(&url).await;
    join(&mut a, "table-1").await;

    send(&mut a, &patch_msg("table-1", title_patch("X"), "origin-a")).await;
    sleep(Duration::from_millis(50)).await;
    send(
        &mut a,
        &patch_msg(
            "table-1",
            StatePatch {
                edit_mode: Some(false),
                ..Default::default()
            },
            "origin-a",
        ),
    )
    .await;

    // another occupant keeps the room alive while we verify via a fresh join
    let mut b = connect(&url).await;
    let snapshot = join(&mut b, "table-1").await;
    assert_eq!(snapshot.title.as_deref(), Some("X"));
    assert_eq!(snapshot.edit_mode, Some(false));
}

#[tokio::test]
async fn overlapping_fields_keep_the_last_received_value() {
    let url = start_relay().await;
    let mut a = connect(&url).await;
    join(&mut a, "table-1").await;

    send(&mut a, &patch_msg("table-1", title_patch("first"), "origin-a")).await;
    sleep(Duration::from_millis(50)).await;
    send(
        &mut a,
        &patch_msg("table-1", title_patch("second"), "origin-a"),
    )
    .await;

    let mut b = connect(&url).await;
    let snapshot = join(&mut b, "table-1").await;
    assert_eq!(snapshot.title.as_deref(), Some("second"));
}

#[tokio::test]
async fn char_events_pass_through_without_touching_the_snapshot() {
    let url = start_relay().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    join(&mut a, "table-1").await;
    join(&mut b, "table-1").await;
    recv_with_timeout(&mut a, RECV_TIMEOUT).await; // user:joined

    send(
        &mut a,
        &ClientMessage::CharAdd {
            table_id: "table-1".to_string(),
            payload: CharAdd {
                value: Character::default(),
            },
            origin_client_id: Some("origin-a".to_string()),
        },
    )
    .await;

    // the peer receives the element event
    match recv_with_timeout(&mut b, RECV_TIMEOUT).await {
        Some(ServerMessage::CharAdd {
            payload,
            origin_client_id,
        }) => {
            assert_eq!(payload.value.name, "New Character");
            assert_eq!(origin_client_id.as_deref(), Some("origin-a"));
        }
        other => panic!("expected char:add, got {:?}", other),
    }

    // ...but a late joiner's snapshot still has the roster of the last full
    // state patch — the staleness window is part of the contract.
    let mut c = connect(&url).await;
    let snapshot = join(&mut c, "table-1").await;
    assert_eq!(snapshot.chars.map(|chars| chars.len()), Some(0));
}

#[tokio::test]
async fn identity_lock_rejects_second_holder() {
    let url = start_relay().await;
    let mut first = connect(&url).await;
    let mut second = connect(&url).await;

    send(
        &mut first,
        &ClientMessage::AuthLogin {
            username: "gm".to_string(),
        },
    )
    .await;
    match recv_with_timeout(&mut first, RECV_TIMEOUT).await {
        Some(ServerMessage::AuthResult { ok: true, .. }) => {}
        other => panic!("expected ok auth:result, got {:?}", other),
    }

    // case-insensitive conflict
    send(
        &mut second,
        &ClientMessage::AuthLogin {
            username: "GM".to_string(),
        },
    )
    .await;
    match recv_with_timeout(&mut second, RECV_TIMEOUT).await {
        Some(ServerMessage::AuthResult { ok: false, reason }) => {
            assert_eq!(reason.as_deref(), Some("username already in use"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    // the first connection still holds the lock
    send(
        &mut first,
        &ClientMessage::AuthLogin {
            username: "gm".to_string(),
        },
    )
    .await;
    match recv_with_timeout(&mut first, RECV_TIMEOUT).await {
        Some(ServerMessage::AuthResult { ok: true, .. }) => {}
        other => panic!("expected holder to keep the lock, got {:?}", other),
    }
}

#[tokio::test]
async fn disconnect_releases_the_identity_lock() {
    let url = start_relay().await;
    let mut first = connect(&url).await;

    send(
        &mut first,
        &ClientMessage::AuthLogin {
            username: "mara".to_string(),
        },
    )
    .await;
    recv_with_timeout(&mut first, RECV_TIMEOUT).await;
    first.close(None).await.expect("close");
    sleep(Duration::from_millis(100)).await;

    let mut second = connect(&url).await;
    send(
        &mut second,
        &ClientMessage::AuthLogin {
            username: "Mara".to_string(),
        },
    )
    .await;
    match recv_with_timeout(&mut second, RECV_TIMEOUT).await {
        Some(ServerMessage::AuthResult { ok: true, .. }) => {}
        other => panic!("expected released identity, got {:?}", other),
    }
}

#[tokio::test]
async fn last_disconnect_destroys_the_room_state() {
    let url = start_relay().await;
    let mut a = connect(&url).await;
    join(&mut a, "table-gone").await;
    send(
        &mut a,
        &patch_msg("table-gone", title_patch("custom"), "origin-a"),
    )
    .await;
    sleep(Duration::from_millis(50)).await;
    a.close(None).await.expect("close");
    sleep(Duration::from_millis(100)).await;

    // a fresh join recreates the room from defaults — the custom title died
    // with the last occupant
    let mut b = connect(&url).await;
    let snapshot = join(&mut b, "table-gone").await;
    assert_eq!(snapshot.title.as_deref(), Some("default"));
    assert_eq!(snapshot.edit_mode, Some(true));
}

#[tokio::test]
async fn empty_room_key_is_dropped_silently() {
    let url = start_relay().await;
    let mut a = connect(&url).await;
    join(&mut a, "table-1").await;

    // empty table key and empty payload both vanish without a reply
    send(&mut a, &patch_msg("", title_patch("X"), "origin-a")).await;
    send(&mut a, &patch_msg("table-1", StatePatch::default(), "origin-a")).await;
    assert!(recv_with_timeout(&mut a, SILENCE_TIMEOUT).await.is_none());

    // the connection is still healthy afterwards
    let mut b = connect(&url).await;
    join(&mut b, "table-1").await;
    recv_with_timeout(&mut a, RECV_TIMEOUT).await; // user:joined
    send(&mut a, &patch_msg("table-1", title_patch("ok"), "origin-a")).await;
    match recv_with_timeout(&mut b, RECV_TIMEOUT).await {
        Some(ServerMessage::StatePatch { payload, .. }) => {
            assert_eq!(payload.title.as_deref(), Some("ok"));
        }
        other => panic!("expected state:patch, got {:?}", other),
    }
}

#[tokio::test]
async fn unparseable_frames_get_an_error_reply() {
    let url = start_relay().await;
    let mut a = connect(&url).await;

    a.send(Message::Text("{not json".into())).await.expect("send");
    match recv_with_timeout(&mut a, RECV_TIMEOUT).await {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "parse_error"),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[tokio::test]
async fn dice_and_music_are_forwarded_to_others_only() {
    let url = start_relay().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    join(&mut a, "table-1").await;
    join(&mut b, "table-1").await;
    recv_with_timeout(&mut a, RECV_TIMEOUT).await; // user:joined

    let roll = DiceRoll {
        name: "GM".to_string(),
        die: 20,
        result: 17,
        ts: 1_700_000_000_000,
    };
    send(
        &mut a,
        &ClientMessage::DiceRoll {
            table_id: "table-1".to_string(),
            payload: roll.clone(),
            origin_client_id: Some("origin-a".to_string()),
        },
    )
    .await;

    match recv_with_timeout(&mut b, RECV_TIMEOUT).await {
        Some(ServerMessage::DiceRoll {
            payload,
            origin_client_id,
        }) => {
            assert_eq!(payload, roll);
            assert_eq!(origin_client_id.as_deref(), Some("origin-a"));
        }
        other => panic!("expected dice:roll, got {:?}", other),
    }

    send(
        &mut b,
        &ClientMessage::MusicControl {
            table_id: "table-1".to_string(),
            payload: MusicControl {
                action: MusicAction::Pause,
                track: None,
            },
        },
    )
    .await;

    match recv_with_timeout(&mut a, RECV_TIMEOUT).await {
        Some(ServerMessage::MusicControl { payload }) => {
            assert_eq!(payload.action, MusicAction::Pause);
        }
        other => panic!("expected music:control, got {:?}", other),
    }

    // neither sender hears their own ephemeral event back
    assert!(recv_with_timeout(&mut a, SILENCE_TIMEOUT).await.is_none());
    assert!(recv_with_timeout(&mut b, SILENCE_TIMEOUT).await.is_none());
}

#[tokio::test]
async fn presence_events_cover_join_and_leave() {
    let url = start_relay().await;
    let mut a = connect(&url).await;
    join(&mut a, "table-1").await;

    let mut b = connect(&url).await;
    join(&mut b, "table-1").await;

    let joined_id = match recv_with_timeout(&mut a, RECV_TIMEOUT).await {
        Some(ServerMessage::UserJoined { user_id, table_id }) => {
            assert_eq!(table_id, "table-1");
            user_id
        }
        other => panic!("expected user:joined, got {:?}", other),
    };

    b.close(None).await.expect("close");
    match recv_with_timeout(&mut a, RECV_TIMEOUT).await {
        Some(ServerMessage::UserLeft { user_id, table_id }) => {
            assert_eq!(table_id, "table-1");
            assert_eq!(user_id, joined_id);
        }
        other => panic!("expected user:left, got {:?}", other),
    }
}
