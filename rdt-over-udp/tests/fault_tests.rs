//! Fault-injection tests: corruption, ACK loss, persistent FIN-ACK loss and
//! retry exhaustion.
//!
//! Faults are injected deterministically, either with a scripted
//! [`Simulator`] in front of one endpoint or with a hand-driven peer socket
//! standing in for the other side.  A short timeout keeps the suite fast.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rdt_over_udp::rdt::Phase;
use rdt_over_udp::segment::{Segment, HEADER_LEN, SEGMENT_LEN};
use rdt_over_udp::simulator::{Fault, Simulator};
use rdt_over_udp::timer::MAX_RETRY_TIMES;
use rdt_over_udp::{RdtError, RdtSocket, RetryPolicy, Socket, Transport};

const TIMEOUT: Duration = Duration::from_millis(100);

async fn ephemeral() -> Socket {
    let addr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn policy() -> RetryPolicy {
    RetryPolicy::default().with_timeout(TIMEOUT)
}

fn is_ack(datagram: &[u8], ack_num: u8) -> bool {
    Segment::decode(datagram).is_ok_and(|s| s.ack && s.ack_num == ack_num)
}

// ---------------------------------------------------------------------------
// Corruption of one data segment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_corrupted_segment_is_retransmitted() {
    let data = pattern(10_000);
    let expected = data.clone();

    // Flip one payload bit in the third datagram the receiver sees.
    let mut seen = 0usize;
    let server_sock = Simulator::scripted(ephemeral().await, move |_, _| {
        seen += 1;
        if seen == 3 {
            Fault::FlipBit((HEADER_LEN + 100) * 8 + 3)
        } else {
            Fault::Deliver
        }
    });
    let server_addr = server_sock.inner().local_addr;

    let server = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(server_sock).with_policy(policy());
        let (received, _) = rdt.recv_from().await.expect("server recv");
        (received, rdt.last_stats())
    });

    let client = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(ephemeral().await).with_policy(policy());
        rdt.send_to(&data, server_addr).await.expect("client send");
        rdt.last_stats()
    });

    let (sr, cr) = tokio::join!(server, client);
    let (received, recv_stats) = sr.unwrap();
    let send_stats = cr.unwrap();

    assert_eq!(received, expected);
    assert_eq!(recv_stats.malformed, 1);
    assert!(recv_stats.unexpected >= 1, "segments after the gap are discarded");
    assert!(send_stats.timeouts >= 1);
    assert!(send_stats.retransmissions >= 1);
}

// ---------------------------------------------------------------------------
// Loss of one ACK
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lost_ack_triggers_window_resend() {
    let data = pattern(10_000);
    let expected = data.clone();

    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;

    let server = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(server_sock).with_policy(policy());
        let (received, _) = rdt.recv_from().await.expect("server recv");
        (received, rdt.last_stats())
    });

    // Drop the ACK that would have emptied the first window.
    let dropped = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&dropped);
    let client_sock = Simulator::scripted(ephemeral().await, move |datagram, _| {
        if is_ack(datagram, 5) && counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Fault::Drop
        } else {
            Fault::Deliver
        }
    });

    let client = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(client_sock).with_policy(policy());
        rdt.send_to(&data, server_addr).await.expect("client send");
        rdt.last_stats()
    });

    let (sr, cr) = tokio::join!(server, client);
    let (received, recv_stats) = sr.unwrap();
    let send_stats = cr.unwrap();

    assert_eq!(received, expected, "no payload appended twice");
    assert!(dropped.load(Ordering::SeqCst) >= 1);
    assert_eq!(send_stats.timeouts, 1);
    // Segment 5 went out again alongside the new segment 6.
    assert_eq!(send_stats.retransmissions, 1);
    assert_eq!(recv_stats.unexpected, 1, "resent #5 re-acknowledged, not re-appended");
}

// ---------------------------------------------------------------------------
// Persistent FIN-ACK loss: best-effort close
// ---------------------------------------------------------------------------

/// Acknowledge every data segment but never the FIN; returns FINs seen.
async fn fin_swallowing_peer(peer: Socket) -> usize {
    let mut fins = 0;
    while let Ok((raw, from)) = peer.recv_timeout(SEGMENT_LEN, Duration::from_secs(1)).await {
        let segment = Segment::decode(&raw).expect("sender emits valid segments");
        if segment.fin {
            fins += 1;
        } else {
            let ack = Segment::ack_for(segment.seq_num).encode();
            peer.send_to(&ack, from).await.unwrap();
        }
    }
    fins
}

#[tokio::test]
async fn test_unacknowledged_fin_closes_after_retry_budget() {
    let peer = ephemeral().await;
    let peer_addr = peer.local_addr;
    let peer_task = tokio::spawn(fin_swallowing_peer(peer));

    let mut rdt = RdtSocket::new(ephemeral().await).with_policy(policy());
    let start = Instant::now();
    rdt.send_to(&pattern(3_000), peer_addr)
        .await
        .expect("best-effort close is not an error");
    let elapsed = start.elapsed();

    let stats = rdt.last_stats();
    assert_eq!(stats.timeouts, u64::from(MAX_RETRY_TIMES) + 1);
    assert!(
        elapsed >= TIMEOUT * MAX_RETRY_TIMES,
        "closed too early: {elapsed:?}"
    );
    assert!(elapsed < Duration::from_secs(5), "closed too late: {elapsed:?}");

    let fins = peer_task.await.unwrap();
    assert_eq!(fins, MAX_RETRY_TIMES as usize + 1);
}

#[tokio::test]
async fn test_lost_fin_ack_still_delivers_data() {
    let data = pattern(4_000);
    let expected = data.clone();

    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;

    let server = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(server_sock).with_policy(policy());
        rdt.recv_from().await.expect("server recv").0
    });

    // 4000 bytes is three segments, so the FIN carries #3.
    let client_sock = Simulator::scripted(ephemeral().await, |datagram, _| {
        if is_ack(datagram, 3) {
            Fault::Drop
        } else {
            Fault::Deliver
        }
    });
    let client = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(client_sock).with_policy(policy());
        rdt.send_to(&data, server_addr).await
    });

    let (sr, cr) = tokio::join!(server, client);
    assert_eq!(sr.unwrap(), expected);
    assert!(cr.unwrap().is_ok());
}

#[tokio::test]
async fn test_stale_fin_replies_do_not_stall_next_transfer() {
    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;

    let server = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(server_sock).with_policy(policy());
        let first = rdt.recv_from().await.expect("first recv").0;
        let second = rdt.recv_from().await.expect("second recv").0;
        (first, second)
    });

    // Lose the first FIN-ACK; by the time the FIN is resent the server is
    // already inside its next recv_from and answers with ACK 63.
    let dropped = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&dropped);
    let client_sock = Simulator::scripted(ephemeral().await, move |datagram, _| {
        if is_ack(datagram, 1) && counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Fault::Drop
        } else {
            Fault::Deliver
        }
    });

    let client = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(client_sock).with_policy(policy());
        rdt.send_to(b"first", server_addr).await.expect("first send");
        let stats = rdt.last_stats();
        rdt.send_to(b"second", server_addr).await.expect("second send");
        stats
    });

    let joined = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(server, client)
    })
    .await
    .expect("back-to-back transfers must finish");
    let (sr, cr) = joined;
    let (first, second) = sr.unwrap();
    let stats = cr.unwrap();

    assert_eq!(first, b"first");
    assert_eq!(second, b"second");
    assert_eq!(dropped.load(Ordering::SeqCst), 1);

    // One data segment plus a bounded run of FINs.
    let fins = u64::from(MAX_RETRY_TIMES) + 1;
    assert_eq!(stats.segments_sent, 1 + fins);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.unexpected, fins - 1);
}

// ---------------------------------------------------------------------------
// Retry exhaustion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sender_aborts_when_no_ack_ever_arrives() {
    // Bound but never read: every data segment vanishes.
    let silent = ephemeral().await;

    let mut rdt = RdtSocket::new(ephemeral().await).with_policy(policy());
    let err = rdt
        .send_to(&pattern(10_000), silent.local_addr)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RdtError::ConnectionAborted {
            phase: Phase::Send,
            retries,
        } if retries == MAX_RETRY_TIMES + 1
    ));

    let stats = rdt.last_stats();
    let rounds = u64::from(MAX_RETRY_TIMES) + 1;
    assert_eq!(stats.timeouts, rounds);
    // Six segments fill the window; every round resends all of them.
    assert_eq!(stats.segments_sent, rounds * 6);
    assert_eq!(stats.retransmissions, (rounds - 1) * 6);
    drop(silent);
}

#[tokio::test]
async fn test_receiver_aborts_when_sender_goes_quiet() {
    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;

    let server = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(server_sock).with_policy(policy());
        let result = rdt.recv_from().await;
        (result, rdt.last_stats())
    });

    // One segment starts the transfer, then nothing.
    let peer = ephemeral().await;
    let seg0 = Segment::new(b"partial".to_vec(), 0, 0).unwrap().encode();
    peer.send_to(&seg0, server_addr).await.unwrap();

    let (result, stats) = server.await.unwrap();
    match result {
        Err(RdtError::ConnectionAborted { phase, retries }) => {
            assert_eq!(phase, Phase::Receive);
            assert_eq!(retries, MAX_RETRY_TIMES + 1);
        }
        other => panic!("expected connection abort, got {other:?}"),
    }
    assert_eq!(stats.timeouts, u64::from(MAX_RETRY_TIMES) + 1);
    assert_eq!(stats.acks_sent, 1);
}

#[tokio::test]
async fn test_stray_datagrams_do_not_disturb_sender() {
    let data = pattern(8_000);
    let expected = data.clone();

    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;

    let server = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(server_sock).with_policy(policy());
        rdt.recv_from().await.expect("server recv").0
    });

    let client_sock = ephemeral().await;
    let client_addr = client_sock.local_addr;

    // A third party sprays ACKs and garbage at the sender.
    let intruder = ephemeral().await;
    for n in 0..6u8 {
        intruder
            .send_to(&Segment::ack_for(n).encode(), client_addr)
            .await
            .unwrap();
    }
    intruder.send_to(&[0xffu8; SEGMENT_LEN], client_addr).await.unwrap();

    let client = tokio::spawn(async move {
        let mut rdt = RdtSocket::new(client_sock).with_policy(policy());
        rdt.send_to(&data, server_addr).await.expect("client send");
        rdt.last_stats()
    });

    let (sr, cr) = tokio::join!(server, client);
    assert_eq!(sr.unwrap(), expected);
    assert!(cr.unwrap().unexpected >= 7);
}
