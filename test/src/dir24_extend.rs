use lpm::{Prefix, Table, INVALID_NEXT_HOP};

fn p(s: &str) -> Prefix {
    s.parse().unwrap()
}

fn ip4(s: &str) -> u32 {
    s.parse::<std::net::Ipv4Addr>().unwrap().into()
}

#[test]
fn slash_25_extends_a_slash_24() {
    let mut t = Table::ipv4_dir24();
    t.insert(p("192.168.1.0/24"), 100).unwrap();
    t.insert(p("192.168.1.128/25"), 200).unwrap();
    assert_eq!(t.lookup_ipv4(ip4("192.168.1.1")), 100);
    assert_eq!(t.lookup_ipv4(ip4("192.168.1.127")), 100);
    assert_eq!(t.lookup_ipv4(ip4("192.168.1.128")), 200);
    assert_eq!(t.lookup_ipv4(ip4("192.168.1.129")), 200);
    assert_eq!(t.lookup_ipv4(ip4("192.168.1.255")), 200);
    assert_eq!(t.lookup_ipv4(ip4("192.168.2.1")), INVALID_NEXT_HOP);
}

#[test]
fn extension_before_the_covering_route() {
    let mut t = Table::ipv4_dir24();
    t.insert(p("192.168.1.128/25"), 200).unwrap();
    t.insert(p("192.168.1.0/24"), 100).unwrap();
    assert_eq!(t.lookup_ipv4(ip4("192.168.1.1")), 100);
    assert_eq!(t.lookup_ipv4(ip4("192.168.1.129")), 200);
}

#[test]
fn deleting_the_extension_keeps_the_floor() {
    let mut t = Table::ipv4_dir24();
    t.insert(p("192.168.1.0/24"), 100).unwrap();
    t.insert(p("192.168.1.128/25"), 200).unwrap();
    t.remove(p("192.168.1.128/25")).unwrap();
    assert_eq!(t.lookup_ipv4(ip4("192.168.1.129")), 100);
    assert_eq!(t.lookup_ipv4(ip4("192.168.1.1")), 100);
}

#[test]
fn nested_extensions_to_a_host_route() {
    let mut t = Table::ipv4_dir24();
    t.insert(p("10.0.0.0/24"), 24).unwrap();
    t.insert(p("10.0.0.0/25"), 25).unwrap();
    t.insert(p("10.0.0.0/26"), 26).unwrap();
    t.insert(p("10.0.0.3/32"), 32).unwrap();
    assert_eq!(t.lookup_ipv4(ip4("10.0.0.3")), 32);
    assert_eq!(t.lookup_ipv4(ip4("10.0.0.4")), 26);
    assert_eq!(t.lookup_ipv4(ip4("10.0.0.64")), 25);
    assert_eq!(t.lookup_ipv4(ip4("10.0.0.128")), 24);
    let s = t.stats();
    // one /24 means one group, however many routes hang under it
    assert_eq!(s.node_count, 1);
    assert_eq!(s.prefix_count, 4);
}

#[test]
fn independent_groups() {
    let mut t = Table::ipv4_dir24();
    for third in 0..32u32 {
        let prefix = format!("10.0.{}.128/25", third);
        t.insert(prefix.parse().unwrap(), 1000 + third).unwrap();
    }
    assert_eq!(t.stats().node_count, 32);
    for third in 0..32u32 {
        let hit = format!("10.0.{}.200", third);
        let miss = format!("10.0.{}.5", third);
        assert_eq!(t.lookup_ipv4(ip4(&hit)), 1000 + third);
        assert_eq!(t.lookup_ipv4(ip4(&miss)), INVALID_NEXT_HOP);
    }
}

#[test]
fn wide_range_insert_reaches_existing_groups() {
    let mut t = Table::ipv4_dir24();
    t.insert(p("10.0.7.128/25"), 200).unwrap();
    // the /16 covers 256 first-level entries, one of which is extended
    t.insert(p("10.0.0.0/16"), 100).unwrap();
    assert_eq!(t.lookup_ipv4(ip4("10.0.7.200")), 200);
    assert_eq!(t.lookup_ipv4(ip4("10.0.7.1")), 100);
    assert_eq!(t.lookup_ipv4(ip4("10.0.200.1")), 100);
}
