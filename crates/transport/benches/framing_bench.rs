use std::hint::black_box;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures::StreamExt;
use futures::task::noop_waker_ref;
use http::{Response, StatusCode};
use micro_transport::buffer::LineBuilder;
use micro_transport::channel::TransferableChannel;
use micro_transport::codec::{HeaderDecoder, HeaderEncoder, PayloadDecoder, PayloadEncoder};
use micro_transport::config::TransportConfig;
use micro_transport::connection::Role;
use micro_transport::protocol::{Entity, MessageHead, PayloadItem, PayloadSize};
use micro_transport::reactor::Reactor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

const REQUEST_HEAD: &[u8] = b"GET /api/v1/items?page=2 HTTP/1.1\r\n\
Host: localhost:8080\r\n\
User-Agent: Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0\r\n\
Accept: text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8\r\n\
Accept-Language: en-US,en;q=0.5\r\n\
Accept-Encoding: gzip, deflate, br\r\n\
Connection: keep-alive\r\n\
Cache-Control: no-cache\r\n\r\n";

fn decode_head(line_builder: &mut LineBuilder, decoder: &mut HeaderDecoder, mut src: Bytes) -> MessageHead {
    decoder.reset();
    let mut head = BytesMut::with_capacity(src.len());
    while line_builder.read_line(&mut src).expect("valid request head") {
        let raw_len = line_builder.len();
        let line = line_builder.take_line();
        decoder.account(raw_len).expect("head within limits");
        head.extend_from_slice(&line);
        head.extend_from_slice(b"\r\n");
        if line.is_empty() {
            break;
        }
    }
    decoder.decode_request(head.freeze()).expect("valid request head")
}

fn bench_header_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("header");
    group.throughput(Throughput::Bytes(REQUEST_HEAD.len() as u64));

    group.bench_function("decode_request_head", |b| {
        let mut line_builder = LineBuilder::new(8 * 1024);
        let mut decoder = HeaderDecoder::new(8 * 1024, 64);
        b.iter(|| black_box(decode_head(&mut line_builder, &mut decoder, Bytes::from_static(REQUEST_HEAD))));
    });

    group.bench_function("encode_response_head", |b| {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header("Server", "micro-transport")
            .header("Cache-Control", "no-cache")
            .body(())
            .expect("valid response");
        let head = MessageHead::Response(response);
        let mut dst = Vec::with_capacity(256);
        b.iter(|| {
            dst.clear();
            HeaderEncoder::encode_start_line(&head, &mut dst).expect("supported version");
            let series = HeaderEncoder::header_series(&head, PayloadSize::Length(1024), Some(&mime::TEXT_PLAIN), true);
            for (name, value) in series.iter() {
                HeaderEncoder::encode_header(name, value, &mut dst).expect("write to vec");
            }
            black_box(dst.len())
        });
    });

    group.finish();
}

fn chunked_body(size: usize, chunk: usize) -> Bytes {
    let data = vec![b'x'; chunk];
    let mut body = BytesMut::new();
    for _ in 0..size / chunk {
        body.extend_from_slice(format!("{chunk:X}\r\n").as_bytes());
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"0\r\n\r\n");
    body.freeze()
}

fn bench_body_decoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("body_decoder");

    for size in [1024, 64 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("length", size), &size, |b, &size| {
            let body = Bytes::from(vec![b'x'; size]);
            b.iter_batched_ref(
                || (body.clone(), BytesMut::with_capacity(size)),
                |(src, dst)| {
                    let mut decoder = PayloadDecoder::fix_length(size as u64);
                    while let Some(item) = decoder.decode(src, dst).expect("valid body") {
                        if item.is_eof() {
                            break;
                        }
                    }
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("chunked", size), &size, |b, &size| {
            let body = chunked_body(size, 1024);
            b.iter_batched_ref(
                || (body.clone(), BytesMut::with_capacity(size)),
                |(src, dst)| {
                    let mut decoder = PayloadDecoder::chunked();
                    while let Some(item) = decoder.decode(src, dst).expect("valid chunked body") {
                        if item.is_eof() {
                            break;
                        }
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_body_encoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("body_encoder");
    let size = 64 * 1024;
    group.throughput(Throughput::Bytes(size as u64));

    for (name, payload_size) in [("length", PayloadSize::Length(size as u64)), ("chunked", PayloadSize::Chunked)] {
        group.bench_function(name, |b| {
            let body = Bytes::from(vec![b'x'; size]);
            let mut window = vec![0; 8 * 1024];
            let mut cx = Context::from_waker(noop_waker_ref());
            b.iter(|| {
                let channel = Box::new(TransferableChannel::memory(body.clone()));
                let mut encoder = PayloadEncoder::new(payload_size, channel);
                let mut total = 0;
                loop {
                    match encoder.poll_transfer(&mut cx, &mut window) {
                        Poll::Ready(Ok(PayloadItem::Chunk(n))) => total += n,
                        Poll::Ready(Ok(PayloadItem::Eof)) => break,
                        Poll::Ready(Err(e)) => panic!("encode error: {e}"),
                        Poll::Pending => unreachable!("in-memory channels are always ready"),
                    }
                }
                black_box(total)
            });
        });
    }

    group.finish();
}

fn bench_reactor_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");

    let (client, handle) = runtime.block_on(async {
        let (reactor, handle) = Reactor::new(TransportConfig::default());
        tokio::spawn(reactor.run());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let client = TcpStream::connect(listener.local_addr().expect("local addr")).await.expect("connect");
        let (server, _) = listener.accept().await.expect("accept");

        let mut connection = handle.register(server, Role::Server).expect("reactor is running");
        tokio::spawn(async move {
            while let Some(Ok(_request)) = connection.next().await {
                let _receipt = connection.enqueue(Response::new(Entity::from_bytes("Hello World!")));
            }
        });
        (Arc::new(Mutex::new(client)), handle)
    });

    let expected = b"HTTP/1.1 200 OK\r\ncontent-length: 12\r\n\r\nHello World!".len();

    c.bench_function("reactor_round_trip", |b| {
        b.to_async(&runtime).iter(|| {
            let client = Arc::clone(&client);
            async move {
                let mut client = client.lock().await;
                let mut response = vec![0; expected];
                client.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.expect("write request");
                client.read_exact(&mut response).await.expect("read response");
                black_box(response)
            }
        });
    });

    handle.shutdown();
}

criterion_group!(benches, bench_header_codec, bench_body_decoder, bench_body_encoder, bench_reactor_round_trip);
criterion_main!(benches);
