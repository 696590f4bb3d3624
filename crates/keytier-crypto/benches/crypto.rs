use keytier_crypto::{decode_message, encode_message, generate_key, open, seal};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn make_message(size: usize) -> String {
    "keytier ".chars().cycle().take(size).collect()
}

#[divan::bench(args = [32, 1024, 65536])]
fn bench_seal(bencher: divan::Bencher, size: usize) {
    let key = generate_key();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| seal(divan::black_box(key.as_bytes()), divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [32, 1024, 65536])]
fn bench_open(bencher: divan::Bencher, size: usize) {
    let key = generate_key();
    let sealed = seal(key.as_bytes(), &make_data(size)).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| open(divan::black_box(key.as_bytes()), divan::black_box(&sealed)).unwrap());
}

#[divan::bench(args = [64, 4096])]
fn bench_encode_message(bencher: divan::Bencher, size: usize) {
    let key = generate_key();
    let message = make_message(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encode_message(divan::black_box(&key), divan::black_box(&message)).unwrap());
}

#[divan::bench(args = [64, 4096])]
fn bench_decode_message(bencher: divan::Bencher, size: usize) {
    let key = generate_key();
    let envelope = encode_message(&key, &make_message(size)).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decode_message(divan::black_box(&key), divan::black_box(&envelope)).unwrap());
}

fn main() {
    divan::main();
}
