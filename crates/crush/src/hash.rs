/// rjenkins1, the old (pre-lookup3) Jenkins hash CRUSH keys its pseudo-random
/// draws on. Distinct from Bob Jenkins' later lookup3.c.
const CRUSH_HASH_SEED: u32 = 1315423911;

/// The `crush_hashmix` avalanche step.
#[inline]
fn crush_hashmix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*b);
    *a = a.wrapping_sub(*c);
    *a ^= *c >> 13;

    *b = b.wrapping_sub(*c);
    *b = b.wrapping_sub(*a);
    *b ^= *a << 8;

    *c = c.wrapping_sub(*a);
    *c = c.wrapping_sub(*b);
    *c ^= *b >> 13;

    *a = a.wrapping_sub(*b);
    *a = a.wrapping_sub(*c);
    *a ^= *c >> 12;

    *b = b.wrapping_sub(*c);
    *b = b.wrapping_sub(*a);
    *b ^= *a << 16;

    *c = c.wrapping_sub(*a);
    *c = c.wrapping_sub(*b);
    *c ^= *b >> 5;

    *a = a.wrapping_sub(*b);
    *a = a.wrapping_sub(*c);
    *a ^= *c >> 3;

    *b = b.wrapping_sub(*c);
    *b = b.wrapping_sub(*a);
    *b ^= *a << 10;

    *c = c.wrapping_sub(*a);
    *c = c.wrapping_sub(*b);
    *c ^= *b >> 15;
}

/// Hash a single 32-bit value using rjenkins1
pub fn crush_hash32(mut a: u32) -> u32 {
    let mut hash = CRUSH_HASH_SEED ^ a;
    let mut b = a;
    let mut x = 231232;
    let mut y = 1232;

    crush_hashmix(&mut b, &mut x, &mut hash);
    crush_hashmix(&mut y, &mut a, &mut hash);

    hash
}

/// Hash two 32-bit values using rjenkins1
pub fn crush_hash32_2(mut a: u32, mut b: u32) -> u32 {
    let mut hash = CRUSH_HASH_SEED ^ a ^ b;
    let mut x = 231232;
    let mut y = 1232;

    crush_hashmix(&mut a, &mut b, &mut hash);
    crush_hashmix(&mut x, &mut a, &mut hash);
    crush_hashmix(&mut b, &mut y, &mut hash);

    hash
}

/// Hash three 32-bit values using rjenkins1
pub fn crush_hash32_3(mut a: u32, mut b: u32, mut c: u32) -> u32 {
    let mut hash = CRUSH_HASH_SEED ^ a ^ b ^ c;
    let mut x = 231232;
    let mut y = 1232;

    crush_hashmix(&mut a, &mut b, &mut hash);
    crush_hashmix(&mut c, &mut x, &mut hash);
    crush_hashmix(&mut y, &mut a, &mut hash);
    crush_hashmix(&mut b, &mut x, &mut hash);
    crush_hashmix(&mut y, &mut c, &mut hash);

    hash
}

/// Hash four 32-bit values using rjenkins1
pub fn crush_hash32_4(mut a: u32, mut b: u32, mut c: u32, mut d: u32) -> u32 {
    let mut hash = CRUSH_HASH_SEED ^ a ^ b ^ c ^ d;
    let mut x = 231232;
    let mut y = 1232;

    crush_hashmix(&mut a, &mut b, &mut hash);
    crush_hashmix(&mut c, &mut d, &mut hash);
    crush_hashmix(&mut a, &mut x, &mut hash);
    crush_hashmix(&mut y, &mut b, &mut hash);
    crush_hashmix(&mut c, &mut x, &mut hash);
    crush_hashmix(&mut y, &mut d, &mut hash);

    hash
}

/// Hash five 32-bit values using rjenkins1
pub fn crush_hash32_5(mut a: u32, mut b: u32, mut c: u32, mut d: u32, mut e: u32) -> u32 {
    let mut hash = CRUSH_HASH_SEED ^ a ^ b ^ c ^ d ^ e;
    let mut x = 231232;
    let mut y = 1232;

    crush_hashmix(&mut a, &mut b, &mut hash);
    crush_hashmix(&mut c, &mut d, &mut hash);
    crush_hashmix(&mut e, &mut x, &mut hash);
    crush_hashmix(&mut y, &mut a, &mut hash);
    crush_hashmix(&mut b, &mut x, &mut hash);
    crush_hashmix(&mut y, &mut c, &mut hash);
    crush_hashmix(&mut d, &mut x, &mut hash);
    crush_hashmix(&mut y, &mut e, &mut hash);

    hash
}

/// rjenkins hash over a byte string, used to fold an input key into the
/// first `x` argument a rule's TAKE step hashes against.
#[inline]
fn rjenkins_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*b);
    *a = a.wrapping_sub(*c);
    *a ^= *c >> 13;

    *b = b.wrapping_sub(*c);
    *b = b.wrapping_sub(*a);
    *b ^= *a << 8;

    *c = c.wrapping_sub(*a);
    *c = c.wrapping_sub(*b);
    *c ^= *b >> 13;

    *a = a.wrapping_sub(*b);
    *a = a.wrapping_sub(*c);
    *a ^= *c >> 12;

    *b = b.wrapping_sub(*c);
    *b = b.wrapping_sub(*a);
    *b ^= *a << 16;

    *c = c.wrapping_sub(*a);
    *c = c.wrapping_sub(*b);
    *c ^= *b >> 5;

    *a = a.wrapping_sub(*b);
    *a = a.wrapping_sub(*c);
    *a ^= *c >> 3;

    *b = b.wrapping_sub(*c);
    *b = b.wrapping_sub(*a);
    *b ^= *a << 10;

    *c = c.wrapping_sub(*a);
    *c = c.wrapping_sub(*b);
    *c ^= *b >> 15;
}

/// Hash a byte string using rjenkins
pub fn ceph_str_hash_rjenkins(data: &[u8]) -> u32 {
    let mut a: u32 = 0x9e3779b9; // the golden ratio
    let mut b: u32 = a;
    let mut c: u32 = 0;

    let mut i = 0;
    let len = data.len();

    // Handle most of the key (12 bytes at a time)
    while i + 12 <= len {
        a = a.wrapping_add(
            data[i] as u32
                | ((data[i + 1] as u32) << 8)
                | ((data[i + 2] as u32) << 16)
                | ((data[i + 3] as u32) << 24),
        );
        b = b.wrapping_add(
            data[i + 4] as u32
                | ((data[i + 5] as u32) << 8)
                | ((data[i + 6] as u32) << 16)
                | ((data[i + 7] as u32) << 24),
        );
        c = c.wrapping_add(
            data[i + 8] as u32
                | ((data[i + 9] as u32) << 8)
                | ((data[i + 10] as u32) << 16)
                | ((data[i + 11] as u32) << 24),
        );
        rjenkins_mix(&mut a, &mut b, &mut c);
        i += 12;
    }

    // Handle the last 11 bytes
    c = c.wrapping_add(len as u32);

    let remaining = len - i;
    match remaining {
        11 => {
            c = c.wrapping_add((data[i + 10] as u32) << 24);
            c = c.wrapping_add((data[i + 9] as u32) << 16);
            c = c.wrapping_add((data[i + 8] as u32) << 8);
            b = b.wrapping_add((data[i + 7] as u32) << 24);
            b = b.wrapping_add((data[i + 6] as u32) << 16);
            b = b.wrapping_add((data[i + 5] as u32) << 8);
            b = b.wrapping_add(data[i + 4] as u32);
            a = a.wrapping_add((data[i + 3] as u32) << 24);
            a = a.wrapping_add((data[i + 2] as u32) << 16);
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        10 => {
            c = c.wrapping_add((data[i + 9] as u32) << 16);
            c = c.wrapping_add((data[i + 8] as u32) << 8);
            b = b.wrapping_add((data[i + 7] as u32) << 24);
            b = b.wrapping_add((data[i + 6] as u32) << 16);
            b = b.wrapping_add((data[i + 5] as u32) << 8);
            b = b.wrapping_add(data[i + 4] as u32);
            a = a.wrapping_add((data[i + 3] as u32) << 24);
            a = a.wrapping_add((data[i + 2] as u32) << 16);
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        9 => {
            c = c.wrapping_add((data[i + 8] as u32) << 8);
            b = b.wrapping_add((data[i + 7] as u32) << 24);
            b = b.wrapping_add((data[i + 6] as u32) << 16);
            b = b.wrapping_add((data[i + 5] as u32) << 8);
            b = b.wrapping_add(data[i + 4] as u32);
            a = a.wrapping_add((data[i + 3] as u32) << 24);
            a = a.wrapping_add((data[i + 2] as u32) << 16);
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        8 => {
            b = b.wrapping_add((data[i + 7] as u32) << 24);
            b = b.wrapping_add((data[i + 6] as u32) << 16);
            b = b.wrapping_add((data[i + 5] as u32) << 8);
            b = b.wrapping_add(data[i + 4] as u32);
            a = a.wrapping_add((data[i + 3] as u32) << 24);
            a = a.wrapping_add((data[i + 2] as u32) << 16);
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        7 => {
            b = b.wrapping_add((data[i + 6] as u32) << 16);
            b = b.wrapping_add((data[i + 5] as u32) << 8);
            b = b.wrapping_add(data[i + 4] as u32);
            a = a.wrapping_add((data[i + 3] as u32) << 24);
            a = a.wrapping_add((data[i + 2] as u32) << 16);
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        6 => {
            b = b.wrapping_add((data[i + 5] as u32) << 8);
            b = b.wrapping_add(data[i + 4] as u32);
            a = a.wrapping_add((data[i + 3] as u32) << 24);
            a = a.wrapping_add((data[i + 2] as u32) << 16);
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        5 => {
            b = b.wrapping_add(data[i + 4] as u32);
            a = a.wrapping_add((data[i + 3] as u32) << 24);
            a = a.wrapping_add((data[i + 2] as u32) << 16);
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        4 => {
            a = a.wrapping_add((data[i + 3] as u32) << 24);
            a = a.wrapping_add((data[i + 2] as u32) << 16);
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        3 => {
            a = a.wrapping_add((data[i + 2] as u32) << 16);
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        2 => {
            a = a.wrapping_add((data[i + 1] as u32) << 8);
            a = a.wrapping_add(data[i] as u32);
        }
        1 => {
            a = a.wrapping_add(data[i] as u32);
        }
        _ => {}
    }

    rjenkins_mix(&mut a, &mut b, &mut c);

    c
}
