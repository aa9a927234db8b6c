//! Integration tests for loopback links as seen through the role traits.

use multiplay_transport::{
    Acceptor, ClientConnection, HostConnection, LinkEvent, LoopbackListener,
};

fn drain(conn: &mut dyn HostConnection) -> Vec<LinkEvent> {
    std::iter::from_fn(|| conn.poll_event()).collect()
}

#[test]
fn test_many_clients_keep_independent_streams() {
    let mut listener = LoopbackListener::new();
    let connector = listener.connector();

    let mut clients: Vec<Box<dyn HostConnection>> = (0..3)
        .map(|_| Box::new(connector.connection()) as Box<dyn HostConnection>)
        .collect();
    for c in &mut clients {
        c.connect().unwrap();
    }

    let mut accepted: Vec<Box<dyn ClientConnection>> =
        std::iter::from_fn(|| listener.poll_accept()).collect();
    assert_eq!(accepted.len(), 3);

    for (i, conn) in accepted.iter_mut().enumerate() {
        conn.send_data(&[i as u8]).unwrap();
    }
    for (i, client) in clients.iter_mut().enumerate() {
        let events = drain(client.as_mut());
        assert_eq!(events, vec![LinkEvent::Connected, LinkEvent::Data(vec![i as u8])]);
    }
}

#[test]
fn test_host_shutdown_is_seen_as_closed_by_client() {
    let mut listener = LoopbackListener::new();
    let mut client = listener.connector().connection();
    client.connect().unwrap();
    let mut conn = listener.poll_accept().unwrap();

    conn.shutdown();
    conn.shutdown();

    let events = drain(&mut client);
    assert_eq!(events, vec![LinkEvent::Connected, LinkEvent::Closed]);
    assert!(client.send_data(b"late").is_err());
}

#[test]
fn test_direct_links_are_not_reconnectable() {
    let listener = LoopbackListener::new();
    let conn = listener.connector().connection();
    assert!(!conn.reconnectable());
}
