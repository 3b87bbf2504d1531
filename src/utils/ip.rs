//! IP 地址处理工具
//!
//! 提供：
//! - 地址解析与数值转换（v4 → u32 范围，v6 → u128）
//! - 私有 / 回环 / 保留地址检测
//! - 随机公网地址生成（用于 /random 与 /benchmark）

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rand::RngExt;

use crate::storage::models::IpVersion;

/// 解析 IP 地址文本，允许首尾空白
pub fn parse_ip(input: &str) -> Option<IpAddr> {
    input.trim().parse::<IpAddr>().ok()
}

/// 地址转换为无符号整数（v4 占低 32 位）
pub fn ip_to_number(ip: &IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u32::from_be_bytes(v4.octets()) as u128,
        IpAddr::V6(v6) => u128::from_be_bytes(v6.octets()),
    }
}

/// 定长大端字节（v4 4 字节，v6 16 字节），字节序比较与数值比较一致
pub fn number_to_be_bytes(number: u128, version: IpVersion) -> Vec<u8> {
    let bytes = number.to_be_bytes();
    bytes[16 - version.byte_width()..].to_vec()
}

/// `number_to_be_bytes` 的逆运算，长度不符时返回 None
pub fn be_bytes_to_number(bytes: &[u8]) -> Option<u128> {
    if bytes.is_empty() || bytes.len() > 16 {
        return None;
    }
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Some(u128::from_be_bytes(buf))
}

/// 检查 IP 是否为私有地址或 localhost
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            // - fc00::/7 (ULA): fc00::/8 + fd00::/8
            // - fe80::/10 (Link-local)
            // - ::1 (Loopback)
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// 不参与解析的 IPv4 网段
const RESERVED_V4: [(u32, u32); 16] = [
    (0x0000_0000, 8),  // 0.0.0.0/8
    (0x0a00_0000, 8),  // 10.0.0.0/8
    (0x6440_0000, 10), // 100.64.0.0/10
    (0x7f00_0000, 8),  // 127.0.0.0/8
    (0xa9fe_0000, 16), // 169.254.0.0/16
    (0xac10_0000, 12), // 172.16.0.0/12
    (0xc000_0000, 24), // 192.0.0.0/24
    (0xc000_0200, 24), // 192.0.2.0/24
    (0xc058_6300, 24), // 192.88.99.0/24
    (0xc0a8_0000, 16), // 192.168.0.0/16
    (0xc612_0000, 15), // 198.18.0.0/15
    (0xc633_6400, 24), // 198.51.100.0/24
    (0xcb00_7100, 24), // 203.0.113.0/24
    (0xe000_0000, 4),  // 224.0.0.0/4 组播
    (0xf000_0000, 4),  // 240.0.0.0/4 保留 + 广播
    (0xffff_ffff, 32), // 255.255.255.255
];

/// 不参与解析的 IPv6 网段
const RESERVED_V6: [(u128, u32); 7] = [
    (0, 128),                                         // ::
    (1, 128),                                         // ::1
    (0x0000_0000_0000_0000_0000_ffff_0000_0000, 96),  // ::ffff:0:0/96 映射地址
    (0x0100_0000_0000_0000_0000_0000_0000_0000, 64),  // 100::/64 丢弃前缀
    (0x2001_0db8_0000_0000_0000_0000_0000_0000, 32),  // 2001:db8::/32 文档
    (0xfc00_0000_0000_0000_0000_0000_0000_0000, 7),   // fc00::/7 ULA
    (0xfe80_0000_0000_0000_0000_0000_0000_0000, 10),  // fe80::/10 链路本地
];

/// 私有、回环、组播、文档及其他保留地址
pub fn is_reserved(ip: &IpAddr) -> bool {
    if is_private_or_local(ip) {
        return true;
    }

    match ip {
        IpAddr::V4(v4) => {
            let bits = u32::from_be_bytes(v4.octets());
            RESERVED_V4.iter().any(|&(net, prefix)| {
                let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
                (bits & mask) == (net & mask)
            })
        }
        IpAddr::V6(v6) => {
            if v6.is_multicast() || v6.is_unspecified() {
                return true;
            }
            let bits = u128::from_be_bytes(v6.octets());
            RESERVED_V6.iter().any(|&(net, prefix)| {
                let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
                (bits & mask) == (net & mask)
            })
        }
    }
}

/// 已分配给 RIR 的常见 IPv6 首段
const V6_FIRST_HEXTETS: [u16; 55] = [
    0x2001, 0x2002, 0x2003, 0x2400, 0x2401, 0x2402, 0x2403, 0x2404, 0x2405, 0x2406, 0x2407,
    0x2408, 0x2409, 0x240a, 0x2600, 0x2601, 0x2602, 0x2603, 0x2604, 0x2605, 0x2606, 0x2607,
    0x2608, 0x2609, 0x2610, 0x2620, 0x2800, 0x2801, 0x2802, 0x2803, 0x2804, 0x2806, 0x2a00,
    0x2a01, 0x2a02, 0x2a03, 0x2a04, 0x2a05, 0x2a06, 0x2a07, 0x2a08, 0x2a09, 0x2a0a, 0x2a0b,
    0x2a0c, 0x2a0d, 0x2a0e, 0x2a0f, 0x2a10, 0x2a11, 0x2a12, 0x2a13, 0x2a14, 0x2c0e, 0x2c0f,
];

/// 生成一个非保留的随机地址
pub fn random_public_ip(version: IpVersion) -> IpAddr {
    let mut rng = rand::rng();
    loop {
        let ip = match version {
            IpVersion::V4 => IpAddr::V4(Ipv4Addr::from(rng.random::<u32>())),
            IpVersion::V6 => {
                let mut segments = [0u16; 8];
                segments[0] = V6_FIRST_HEXTETS[rng.random_range(0..V6_FIRST_HEXTETS.len())];
                for segment in segments.iter_mut().skip(1) {
                    *segment = rng.random();
                }
                IpAddr::V6(Ipv6Addr::from(segments))
            }
        };
        if !is_reserved(&ip) {
            return ip;
        }
    }
}
