use lpm::{Prefix, Table, INVALID_NEXT_HOP};

fn p(s: &str) -> Prefix {
    s.parse().unwrap()
}

fn ip6(s: &str) -> [u8; 16] {
    s.parse::<std::net::Ipv6Addr>().unwrap().octets()
}

#[test]
fn allocation_ladder() {
    let mut t = Table::ipv6_wide16();
    t.insert(p("2001:db8::/32"), 100).unwrap();
    t.insert(p("2001:db8:1::/48"), 200).unwrap();
    t.insert(p("2001:db8:1:2::/64"), 300).unwrap();
    assert_eq!(t.lookup_ipv6(&ip6("2001:db8::1")), 100);
    assert_eq!(t.lookup_ipv6(&ip6("2001:db8:1::1")), 200);
    assert_eq!(t.lookup_ipv6(&ip6("2001:db8:1:2::1")), 300);
    assert_eq!(t.lookup_ipv6(&ip6("2001:db9::1")), INVALID_NEXT_HOP);
}

#[test]
fn first_stride_boundary() {
    let mut t = Table::ipv6_wide16();
    // /16 ends exactly on the wide stride, /17 is the first bit past it
    t.insert(p("2001::/16"), 16).unwrap();
    t.insert(p("2001:8000::/17"), 17).unwrap();
    assert_eq!(t.lookup_ipv6(&ip6("2001:1::1")), 16);
    assert_eq!(t.lookup_ipv6(&ip6("2001:8000::1")), 17);
    assert_eq!(t.lookup_ipv6(&ip6("2001:ffff::1")), 17);
    assert_eq!(t.lookup_ipv6(&ip6("2002::1")), INVALID_NEXT_HOP);
}

#[test]
fn short_prefix_expands_the_root() {
    let mut t = Table::ipv6_wide16();
    t.insert(p("fc00::/7"), 7).unwrap();
    assert_eq!(t.lookup_ipv6(&ip6("fc00::1")), 7);
    assert_eq!(t.lookup_ipv6(&ip6("fdff:ffff::1")), 7);
    assert_eq!(t.lookup_ipv6(&ip6("fe00::1")), INVALID_NEXT_HOP);
    assert_eq!(t.lookup_ipv6(&ip6("fbff::1")), INVALID_NEXT_HOP);
}

#[test]
fn deep_prefixes_past_64() {
    let mut t = Table::ipv6_wide16();
    t.insert(p("2001:db8::/65"), 65).unwrap();
    t.insert(p("2001:db8:0:0:8000::/65"), 66).unwrap();
    assert_eq!(t.lookup_ipv6(&ip6("2001:db8::1")), 65);
    assert_eq!(t.lookup_ipv6(&ip6("2001:db8:0:0:7fff::1")), 65);
    assert_eq!(t.lookup_ipv6(&ip6("2001:db8:0:0:8000::1")), 66);
    assert_eq!(t.lookup_ipv6(&ip6("2001:db9::")), INVALID_NEXT_HOP);
}

#[test]
fn wide_and_stride8_agree_on_the_ladder() {
    let routes = [
        ("2001:db8::/32", 100),
        ("2001:db8:1::/48", 200),
        ("2001:db8:1:2::/64", 300),
        ("2001:db8:1:2:3::/80", 400),
        ("::/0", 999),
    ];
    let mut wide = Table::ipv6_wide16();
    let mut stride = Table::ipv6_stride8();
    for (s, nh) in routes {
        wide.insert(p(s), nh).unwrap();
        stride.insert(p(s), nh).unwrap();
    }
    for a in [
        "2001:db8::1",
        "2001:db8:1::1",
        "2001:db8:1:2::1",
        "2001:db8:1:2:3::1",
        "2001:db8:1:2:4::1",
        "fd00::1",
    ] {
        assert_eq!(
            wide.lookup_ipv6(&ip6(a)),
            stride.lookup_ipv6(&ip6(a)),
            "at {}",
            a
        );
    }
}
