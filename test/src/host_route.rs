use lpm::{Prefix, Table, INVALID_NEXT_HOP};

fn p(s: &str) -> Prefix {
    s.parse().unwrap()
}

fn ip4(s: &str) -> u32 {
    s.parse::<std::net::Ipv4Addr>().unwrap().into()
}

fn ip6(s: &str) -> [u8; 16] {
    s.parse::<std::net::Ipv6Addr>().unwrap().octets()
}

#[test]
fn v6_host_route() {
    for table in [Table::ipv6_wide16 as fn() -> Table, Table::ipv6_stride8] {
        let mut t = table();
        t.insert(p("2001:db8::1/128"), 500).unwrap();
        assert_eq!(t.lookup_ipv6(&ip6("2001:db8::1")), 500);
        assert_eq!(t.lookup_ipv6(&ip6("2001:db8::2")), INVALID_NEXT_HOP);
    }
}

#[test]
fn v4_host_route() {
    for table in [Table::ipv4_dir24 as fn() -> Table, Table::ipv4_stride8] {
        let mut t = table();
        t.insert(p("203.0.113.7/32"), 500).unwrap();
        assert_eq!(t.lookup_ipv4(ip4("203.0.113.7")), 500);
        assert_eq!(t.lookup_ipv4(ip4("203.0.113.6")), INVALID_NEXT_HOP);
        assert_eq!(t.lookup_ipv4(ip4("203.0.113.8")), INVALID_NEXT_HOP);
    }
}

#[test]
fn host_route_round_trip() {
    for table in [Table::ipv6_wide16 as fn() -> Table, Table::ipv6_stride8] {
        let mut t = table();
        t.insert(p("2001:db8::1/128"), 500).unwrap();
        t.remove(p("2001:db8::1/128")).unwrap();
        assert_eq!(t.lookup_ipv6(&ip6("2001:db8::1")), INVALID_NEXT_HOP);
        assert_eq!(t.prefix_count(), 0);
    }
}

#[test]
fn adjacent_host_routes() {
    let mut t = Table::ipv4_dir24();
    t.insert(p("203.0.113.6/32"), 6).unwrap();
    t.insert(p("203.0.113.7/32"), 7).unwrap();
    t.insert(p("203.0.113.6/31"), 31).unwrap();
    assert_eq!(t.lookup_ipv4(ip4("203.0.113.6")), 6);
    assert_eq!(t.lookup_ipv4(ip4("203.0.113.7")), 7);
    // deleting a host route does not restore the covering /31; a consumer
    // that wants fallback re-inserts it
    t.remove(p("203.0.113.6/32")).unwrap();
    assert_eq!(t.lookup_ipv4(ip4("203.0.113.6")), INVALID_NEXT_HOP);
    assert_eq!(t.lookup_ipv4(ip4("203.0.113.7")), 7);
    t.insert(p("203.0.113.6/31"), 31).unwrap();
    assert_eq!(t.lookup_ipv4(ip4("203.0.113.6")), 31);
    assert_eq!(t.lookup_ipv4(ip4("203.0.113.7")), 7);
}
