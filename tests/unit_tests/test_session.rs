// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end session scenarios against the scripted in-process server.

use anyhow::{Context, Result};
use dctm_client_rs::client::docbase::{ApplyBody, DocbaseClient};
use dctm_client_rs::rpc::messages::ServerError;
use serial_test::serial;
use tokio::net::TcpListener;

use crate::unit_tests::mock_server::{
    OutItem, read_frame, respond, send_callback, serve_handshake, test_config,
};

fn type_only_text(attr_line: &str) -> String {
    format!("TYPE GeneratedType 0000000000000000 NULL\n1\n{attr_line}\n")
}

fn record_text(object_id: &str) -> String {
    format!("OBJ GeneratedType\n1\nA {} {}\n0\n", object_id.len(), object_id)
}

/// Docbase-id resolution: the server rejects id −1 with the literal reason
/// and the client reconnects with the advertised id.
#[tokio::test]
#[serial]
async fn docbase_id_resolution() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        // first connection: wrong id, reason only, then the client hangs up
        let (mut stream, _) = listener.accept().await?;
        let frame = read_frame(&mut stream).await?.context("expected frame")?;
        assert_eq!(frame.rpc, 51);
        assert_eq!(frame.items[0].as_int(), -1);
        // hello header carries (version, release, inumber)
        assert_eq!(frame.hello, vec![3, 5, 769]);
        respond(
            &mut stream,
            frame.sequence,
            &[OutItem::Str(
                "Wrong docbase id: (-1) expecting: (4242)".to_string(),
            )],
        )
        .await?;
        assert!(read_frame(&mut stream).await?.is_none(), "client should hang up");

        // second connection: real handshake, now with the resolved id
        let (mut stream, _) = listener.accept().await?;
        let frame = read_frame(&mut stream).await?.context("expected frame")?;
        assert_eq!(frame.rpc, 51);
        assert_eq!(frame.items[0].as_int(), 4242);
        respond(
            &mut stream,
            frame.sequence,
            &[
                OutItem::Str(String::new()),
                OutItem::IntArray(vec![0, 2, -1, 2, 0, 0, 0, 0, 0, 0]),
                OutItem::Str("0123456789abcdef".to_string()),
            ],
        )
        .await?;
        let frame = read_frame(&mut stream).await?.context("entry points")?;
        assert_eq!(frame.rpc, 62);
        respond(
            &mut stream,
            frame.sequence,
            &[
                OutItem::Str(crate::unit_tests::mock_server::entry_points_text()),
                OutItem::Int(1),
                OutItem::Int(0),
                OutItem::Int(0),
            ],
        )
        .await?;
        let frame = read_frame(&mut stream).await?.context("set locale")?;
        assert_eq!(frame.rpc, 59);
        respond(
            &mut stream,
            frame.sequence,
            &[OutItem::Int(1), OutItem::Int(1), OutItem::Int(0)],
        )
        .await?;
        // drain whatever the disconnect sends
        while read_frame(&mut stream).await?.is_some() {}
        anyhow::Ok(())
    });

    let mut cfg = test_config(port);
    cfg.docbase.docbaseid = -1;
    let mut session = DocbaseClient::connect(&cfg).await?;
    assert_eq!(session.docbaseid(), 4242);
    assert_eq!(session.session_id(), "0123456789abcdef");
    assert!(session.entrypoints().contains_key("EXEC"));
    session.disconnect().await?;

    server.await??;
    Ok(())
}

/// Collection drain: 150 rows at BATCH_HINT=50 produce exactly three
/// MULTI_NEXT calls plus one CLOSE_COLLECTION, rows in server order.
#[tokio::test]
#[serial]
async fn collection_drain() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        serve_handshake(&mut stream).await?;

        let frame = read_frame(&mut stream).await?.context("expected EXEC")?;
        assert_eq!(frame.rpc, 54, "expected APPLY");
        assert_eq!(frame.items[1].as_int(), 223, "expected the EXEC opcode");
        let request = frame.items[3].as_str().to_string();
        assert!(request.contains("BATCH_HINT INT S 0\n50\n"), "{request}");
        respond(
            &mut stream,
            frame.sequence,
            &[
                OutItem::Str(type_only_text("r_object_id STRING S 16")),
                OutItem::Int(7),
                OutItem::Int(0),
                OutItem::Int(1),
                OutItem::Int(0),
            ],
        )
        .await?;

        let mut multi_next = 0;
        let mut close_collection = 0;
        let mut row = 0;
        loop {
            let Some(frame) = read_frame(&mut stream).await? else {
                break;
            };
            match frame.rpc {
                56 => {
                    multi_next += 1;
                    assert_eq!(frame.items[1].as_int(), 7, "collection id");
                    assert_eq!(frame.items[2].as_int(), 50, "batch hint");
                    let mut batch = String::new();
                    for _ in 0..50 {
                        row += 1;
                        batch.push_str(&record_text(&format!("09000000800{row:05}")));
                    }
                    let more = i64::from(multi_next < 3);
                    respond(
                        &mut stream,
                        frame.sequence,
                        &[
                            OutItem::Str(batch),
                            OutItem::Int(50),
                            OutItem::Int(more),
                            OutItem::Int(1),
                            OutItem::Int(0),
                        ],
                    )
                    .await?;
                }
                57 => {
                    close_collection += 1;
                    assert_eq!(frame.items[1].as_int(), 7, "collection id");
                    respond(&mut stream, frame.sequence, &[OutItem::Int(0), OutItem::Int(0)])
                        .await?;
                }
                52 => {} // CLOSE_SESSION is fire-and-forget
                other => panic!("unexpected rpc {other}"),
            }
        }
        anyhow::Ok((multi_next, close_collection))
    });

    let cfg = test_config(port);
    let mut session = DocbaseClient::connect(&cfg).await?;
    let mut collection = session
        .execute("select r_object_id from dm_document", false, 50, false)
        .await?;

    let mut rows = Vec::new();
    while let Some(record) = collection.next_record(&mut session).await? {
        rows.push(record.string("r_object_id").context("r_object_id")?);
    }
    assert_eq!(rows.len(), 150);
    assert_eq!(rows[0], "0900000080000001");
    assert_eq!(rows[149], "0900000080000150");
    assert!(rows.windows(2).all(|w| w[0] < w[1]), "server order preserved");
    assert!(collection.is_closed());

    session.disconnect().await?;
    let (multi_next, close_collection) = server.await??;
    assert_eq!(multi_next, 3);
    assert_eq!(close_collection, 1);
    Ok(())
}

/// OOB bit 0x02: the client fetches GET_ERRORS exactly once and surfaces
/// the error-severity message text.
#[tokio::test]
#[serial]
async fn oob_messages_raise_server_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        serve_handshake(&mut stream).await?;

        // the query comes back invalid with pending messages
        let frame = read_frame(&mut stream).await?.context("expected EXEC")?;
        assert_eq!(frame.rpc, 54);
        respond(
            &mut stream,
            frame.sequence,
            &[
                OutItem::Str(String::new()),
                OutItem::Int(-1),
                OutItem::Int(0),
                OutItem::Int(0),
                OutItem::Int(0x02),
            ],
        )
        .await?;

        // exactly one GET_ERRORS fetch, one inline record of severity 3
        let mut get_errors = 0;
        loop {
            let Some(frame) = read_frame(&mut stream).await? else {
                break;
            };
            match frame.rpc {
                54 => {
                    assert_eq!(frame.items[1].as_int(), 558, "expected GET_ERRORS");
                    get_errors += 1;
                    let text = format!(
                        "TYPE GeneratedType 0000000000000000 NULL\n4\n\
                         NAME STRING S 64\nSEVERITY INT S 0\nCOUNT INT S 0\n1 STRING S 64\n\
                         OBJ GeneratedType\n4\nA 14 DM_TEST_E_FAIL\n3\n1\nA 4 boom\n0\n"
                    );
                    respond(
                        &mut stream,
                        frame.sequence,
                        &[
                            OutItem::Str(text),
                            OutItem::Int(9),
                            OutItem::Int(0),
                            OutItem::Int(0),
                            OutItem::Int(0),
                        ],
                    )
                    .await?;
                }
                57 => {
                    respond(&mut stream, frame.sequence, &[OutItem::Int(0), OutItem::Int(0)])
                        .await?;
                }
                52 => {}
                other => panic!("unexpected rpc {other}"),
            }
        }
        anyhow::Ok(get_errors)
    });

    let cfg = test_config(port);
    let mut session = DocbaseClient::connect(&cfg).await?;
    let err = session
        .execute("select broken from nowhere", false, 20, false)
        .await
        .expect_err("query must fail");
    let server_error = err
        .downcast_ref::<ServerError>()
        .context("expected a server error")?;
    assert!(
        server_error.text.contains("[DM_TEST_E_FAIL] boom"),
        "{}",
        server_error.text
    );

    session.disconnect().await?;
    let get_errors = server.await??;
    assert_eq!(get_errors, 1, "exactly one GET_ERRORS per failing call");
    Ok(())
}

/// Chunked argument: a 130000-byte request splits into 63000+63000+4000
/// APPLY_FOR_LONG pieces framed by SET_PUSH_OBJECT_STATUS, and the real
/// APPLY ships the placeholder marker.
#[tokio::test]
#[serial]
async fn chunked_apply() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        let session_id = serve_handshake(&mut stream).await?;

        let mut push_status = Vec::new();
        let mut chunk_sizes = Vec::new();
        let mut final_request = None;
        loop {
            let Some(frame) = read_frame(&mut stream).await? else {
                break;
            };
            match frame.rpc {
                59 => {
                    // SET_PUSH_OBJECT_STATUS
                    assert_eq!(frame.items[1].as_int(), 301);
                    let body = frame.items[3].as_str().to_string();
                    push_status.push(body.contains("_PUSH_STATUS_ BOOL S 0\nT\n"));
                    assert!(body.contains(&format!("_PUSHED_ID_ ID S 0\n{session_id}\n")));
                    respond(
                        &mut stream,
                        frame.sequence,
                        &[OutItem::Int(1), OutItem::Int(1), OutItem::Int(0)],
                    )
                    .await?;
                }
                58 => {
                    // APPLY_FOR_LONG carries one piece
                    assert_eq!(frame.items[1].as_int(), 300, "DO_METHOD opcode");
                    chunk_sizes.push(frame.items[3].as_str().len());
                    respond(
                        &mut stream,
                        frame.sequence,
                        &[OutItem::Int(0), OutItem::Int(1), OutItem::Int(0)],
                    )
                    .await?;
                }
                54 => {
                    final_request = Some(frame.items[3].as_str().to_string());
                    respond(
                        &mut stream,
                        frame.sequence,
                        &[
                            OutItem::Str(type_only_text("result STRING S 64")),
                            OutItem::Int(11),
                            OutItem::Int(0),
                            OutItem::Int(0),
                            OutItem::Int(0),
                        ],
                    )
                    .await?;
                }
                57 => {
                    respond(&mut stream, frame.sequence, &[OutItem::Int(0), OutItem::Int(0)])
                        .await?;
                }
                52 => {}
                other => panic!("unexpected rpc {other}"),
            }
        }
        anyhow::Ok((push_status, chunk_sizes, final_request))
    });

    let cfg = test_config(port);
    let mut session = DocbaseClient::connect(&cfg).await?;
    let request = "x".repeat(130_000);
    let collection = session
        .apply_collection("", "DO_METHOD", ApplyBody::Raw(request))
        .await?;
    assert!(collection.is_some());

    session.disconnect().await?;
    let (push_status, chunk_sizes, final_request) = server.await??;
    assert_eq!(push_status, vec![true, false]);
    assert_eq!(chunk_sizes, vec![63000, 63000, 4000]);
    assert_eq!(
        final_request.context("no final APPLY")?,
        "_USE_SESSION_CHUNKED_OBJ_STRING_"
    );
    Ok(())
}

/// Upload role inversion: the server drives with its own sequence numbers
/// and chunk-size rpc codes until it signals stop; the client then sends
/// one empty frame on its own sequence.
#[tokio::test]
#[serial]
async fn upload_role_inversion() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        serve_handshake(&mut stream).await?;

        let frame = read_frame(&mut stream).await?.context("expected DO_PUSH")?;
        assert_eq!(frame.rpc, 27);
        assert_eq!(frame.items[1].as_int(), 5, "pusher handle");

        // drive two GET_BLOCK2-sized chunks, then stop
        send_callback(&mut stream, 1000, 3, &[]).await?;
        let reply = read_frame(&mut stream).await?.context("chunk 1")?;
        assert_eq!(reply.sequence, 1000, "client answers on the server sequence");
        assert_eq!(reply.rpc, 0);
        assert_eq!(reply.items[0].as_int(), 1024);
        assert_eq!(reply.items[1].as_int(), 0);
        assert_eq!(reply.items[2].as_str().len(), 1024);

        send_callback(&mut stream, 1001, 3, &[]).await?;
        let reply = read_frame(&mut stream).await?.context("chunk 2")?;
        assert_eq!(reply.sequence, 1001);
        assert_eq!(reply.items[0].as_int(), 476);
        assert_eq!(reply.items[1].as_int(), 1, "last chunk flagged");
        assert_eq!(reply.items[2].as_str().len(), 476);

        send_callback(&mut stream, 1002, 17023, &[]).await?;
        let fin = read_frame(&mut stream).await?.context("final frame")?;
        assert_eq!(fin.rpc, 0);
        assert_ne!(fin.sequence, 1002, "final frame runs on the client sequence");
        assert!(fin.items.is_empty());

        while read_frame(&mut stream).await?.is_some() {}
        anyhow::Ok(())
    });

    let cfg = test_config(port);
    let mut session = DocbaseClient::connect(&cfg).await?;
    let data = vec![b'u'; 1500];
    session.upload(5, &data).await?;

    session.disconnect().await?;
    server.await??;
    Ok(())
}

/// Disconnect closes every live collection and leaves the session unusable.
#[tokio::test]
#[serial]
async fn disconnect_closes_collections() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        serve_handshake(&mut stream).await?;

        let frame = read_frame(&mut stream).await?.context("expected EXEC")?;
        assert_eq!(frame.rpc, 54);
        respond(
            &mut stream,
            frame.sequence,
            &[
                OutItem::Str(type_only_text("r_object_id STRING S 16")),
                OutItem::Int(3),
                OutItem::Int(0),
                OutItem::Int(1),
                OutItem::Int(0),
            ],
        )
        .await?;

        let mut closed = 0;
        loop {
            let Some(frame) = read_frame(&mut stream).await? else {
                break;
            };
            match frame.rpc {
                57 => {
                    closed += 1;
                    assert_eq!(frame.items[1].as_int(), 3);
                    respond(&mut stream, frame.sequence, &[OutItem::Int(0), OutItem::Int(0)])
                        .await?;
                }
                52 => {}
                other => panic!("unexpected rpc {other}"),
            }
        }
        anyhow::Ok(closed)
    });

    let cfg = test_config(port);
    let mut session = DocbaseClient::connect(&cfg).await?;
    let collection = session
        .execute("select r_object_id from dm_document", false, 20, false)
        .await?;
    assert!(!collection.is_closed());

    session.disconnect().await?;
    assert!(collection.is_closed(), "disconnect closes live cursors");
    assert!(
        session.query("select 1 from dm_document").await.is_err(),
        "a disconnected session refuses further calls"
    );

    let closed = server.await??;
    assert_eq!(closed, 1);
    Ok(())
}
