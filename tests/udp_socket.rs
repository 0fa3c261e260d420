use dhcp_net::network::{bind_udp_socket, send_udp_socket, udp, SocketError};
use std::{net::Ipv4Addr, time::Duration};
use tokio::time;

fn local_port(socket: &socket2::Socket) -> u16 {
    socket
        .local_addr()
        .unwrap()
        .as_socket_ipv4()
        .unwrap()
        .port()
}

#[test]
fn test_bind_wildcard_ephemeral() {
    let socket = bind_udp_socket(Ipv4Addr::UNSPECIFIED, 0).unwrap();
    let local = socket.local_addr().unwrap().as_socket_ipv4().unwrap();

    assert_eq!(*local.ip(), Ipv4Addr::UNSPECIFIED);
    assert_ne!(local.port(), 0);
}

#[test]
fn test_bind_port_in_use() {
    let first = bind_udp_socket(Ipv4Addr::LOCALHOST, 0).unwrap();
    let port = local_port(&first);

    let err = bind_udp_socket(Ipv4Addr::LOCALHOST, port).unwrap_err();
    assert!(matches!(err, SocketError::BindSocket(_)));
    assert_eq!(err.errno(), -libc::EADDRINUSE);
}

#[tokio::test]
async fn test_send_datagram() {
    let receiver = bind_udp_socket(Ipv4Addr::LOCALHOST, 0).unwrap();
    let port = local_port(&receiver);
    let receiver = udp::into_tokio(receiver).unwrap();

    let sender = bind_udp_socket(Ipv4Addr::LOCALHOST, 0).unwrap();
    let sender_port = local_port(&sender);
    send_udp_socket(&sender, Ipv4Addr::LOCALHOST, port, b"DHCPREQUEST").unwrap();

    let mut buf = [0u8; 64];
    let (len, from) = time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
        .await
        .expect("datagram not delivered")
        .unwrap();

    assert_eq!(&buf[..len], b"DHCPREQUEST");
    assert_eq!(from.port(), sender_port);
}

#[tokio::test]
async fn test_send_zero_length_datagram() {
    let receiver = bind_udp_socket(Ipv4Addr::LOCALHOST, 0).unwrap();
    let port = local_port(&receiver);
    let receiver = udp::into_tokio(receiver).unwrap();

    let sender = bind_udp_socket(Ipv4Addr::LOCALHOST, 0).unwrap();
    send_udp_socket(&sender, Ipv4Addr::LOCALHOST, port, &[]).unwrap();

    let mut buf = [0xaau8; 16];
    let (len, _) = time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
        .await
        .expect("empty datagram not delivered")
        .unwrap();

    assert_eq!(len, 0);
}

#[test]
fn test_send_unreachable_reports_errno() {
    let sender = bind_udp_socket(Ipv4Addr::LOCALHOST, 0).unwrap();

    // A loopback-bound socket cannot reach an address off the host.
    let err = send_udp_socket(&sender, Ipv4Addr::new(192, 0, 2, 1), 67, b"x").unwrap_err();

    assert!(matches!(err, SocketError::Send(_)));
    assert!(err.raw_os_error().is_some());
    assert_eq!(err.errno(), -err.raw_os_error().unwrap());
}
