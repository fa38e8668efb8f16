// End-to-end runs against a real listener on port 0, with in-process agency
// clients speaking the wire protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use quiniela::bet::Bet;
use quiniela::server::{Server, ServerConfig};
use quiniela::store::Store;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

#[tokio::test]
async fn winners_fan_out_to_their_own_agency() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("bets.csv")).await.unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = Server::new(config(2), store.clone());
    let run = tokio::spawn(server.run_with_listener(listener, shutdown_rx));

    let a = tokio::spawn(agency_session(
        addr,
        1,
        vec![vec![bet(1, "30111222", 7574), bet(1, "27555111", 1234)]],
    ));
    let b = tokio::spawn(agency_session(
        addr,
        2,
        vec![vec![bet(2, "18999000", 1234), bet(2, "40123456", 5678)]],
    ));

    let a_winners = timeout(Duration::from_secs(5), a).await.unwrap().unwrap();
    let b_winners = timeout(Duration::from_secs(5), b).await.unwrap().unwrap();
    assert_eq!(a_winners, "30111222\n");
    assert_eq!(b_winners, "");

    timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(store.load_all().await.unwrap().len(), 4);
}

#[tokio::test]
async fn failed_agency_aborts_the_draw_for_its_peers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("bets.csv")).await.unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = Server::new(config(2), store.clone());
    let run = tokio::spawn(server.run_with_listener(listener, shutdown_rx));

    // Peer that completes its submission and then waits for the draw.
    let healthy = tokio::spawn(async move {
        let mut sock = TcpStream::connect(addr).await.unwrap();
        let mut payload = Vec::new();
        bet(2, "18999000", 7574).encode(&mut payload);
        sock.write_all(&(payload.len() as u16).to_be_bytes())
            .await
            .unwrap();
        sock.write_all(&payload).await.unwrap();
        let mut ack = [0u8; 7];
        sock.read_exact(&mut ack).await.unwrap();
        sock.write_all(&0u16.to_be_bytes()).await.unwrap();
        sock.write_all(&2u16.to_be_bytes()).await.unwrap();
        // The draw never happens; the connection just ends (EOF or reset).
        let mut out = Vec::new();
        let _ = sock.read_to_end(&mut out).await;
    });

    // Broken agency: declares a 100-byte batch and vanishes.
    let broken = tokio::spawn(async move {
        let mut sock = TcpStream::connect(addr).await.unwrap();
        sock.write_all(&100u16.to_be_bytes()).await.unwrap();
        sock.write_all(&[1, 2, 3]).await.unwrap();
    });

    broken.await.unwrap();
    timeout(Duration::from_secs(5), healthy)
        .await
        .expect("peer must be released, not left waiting")
        .unwrap();

    let run_result = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(run_result.is_err());
}

#[tokio::test]
async fn shutdown_signal_ends_the_run_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("bets.csv")).await.unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = Server::new(config(5), store);
    let run = tokio::spawn(server.run_with_listener(listener, shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    timeout(Duration::from_secs(5), run)
        .await
        .expect("shutdown must end the run")
        .unwrap()
        .unwrap();
}

fn config(agencies: usize) -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        backlog: 16,
        agencies,
    }
}

fn bet(agency: u32, document: &str, number: u32) -> Bet {
    Bet {
        agency,
        first_name: "Ana".into(),
        last_name: "Diaz".into(),
        document: document.into(),
        birthdate: NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
        number,
    }
}

/// Drive one full agency session: batches, terminator, trailer, winner read.
async fn agency_session(addr: SocketAddr, agency: u16, batches: Vec<Vec<Bet>>) -> String {
    let mut sock = TcpStream::connect(addr).await.unwrap();
    for batch in batches {
        let mut payload = Vec::new();
        for b in &batch {
            b.encode(&mut payload);
        }
        sock.write_all(&(payload.len() as u16).to_be_bytes())
            .await
            .unwrap();
        sock.write_all(&payload).await.unwrap();

        let mut ack = [0u8; 7];
        sock.read_exact(&mut ack).await.unwrap();
        assert_eq!(&ack, b"success");
    }

    sock.write_all(&0u16.to_be_bytes()).await.unwrap();
    sock.write_all(&agency.to_be_bytes()).await.unwrap();

    let mut winners = String::new();
    sock.read_to_string(&mut winners).await.unwrap();
    winners
}
