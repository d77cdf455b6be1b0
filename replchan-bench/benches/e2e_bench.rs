//! End-to-end client benchmarks against an in-process exec host.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures_util::{SinkExt, StreamExt};
use replchan_client::{Channel, Client, ConnectionConfig};
use replchan_protocol::{
    CloseChannelRes, CloseStatus, Decoder, Encoder, Frame, OpenChannelRes, OpenState, Payload,
    State,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio_tungstenite::tungstenite::Message;

/// Answers opens and closes; each exec gets one output frame per argument
/// followed by an ok.
async fn serve_connection(stream: TcpStream) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let mut next_id = 1u32;

    while let Some(Ok(message)) = source.next().await {
        let Message::Binary(data) = message else {
            continue;
        };
        let Ok(request) = Decoder::decode(&data) else {
            continue;
        };

        let replies = match request.payload {
            Some(Payload::OpenChan(_)) => {
                let id = next_id;
                next_id += 1;
                let mut reply = Frame::control(OpenChannelRes {
                    id,
                    state: OpenState::Created,
                    error: None,
                });
                reply.reference = request.reference;
                vec![reply]
            }
            Some(Payload::CloseChan(close)) => {
                let mut reply = Frame::control(CloseChannelRes {
                    id: close.id,
                    status: CloseStatus::Close,
                });
                reply.reference = request.reference;
                vec![reply]
            }
            Some(Payload::Exec(exec)) => {
                let mut frames: Vec<Frame> = exec
                    .args
                    .iter()
                    .map(|arg| {
                        Frame::on_channel(request.channel)
                            .with_output(arg.clone())
                            .with_state(State::Running)
                    })
                    .collect();
                frames.push(Frame::on_channel(request.channel).with_ok());
                frames
            }
            _ => Vec::new(),
        };

        for reply in replies {
            let encoded = Encoder::encode(&reply).unwrap();
            if sink.send(Message::Binary(encoded.to_vec())).await.is_err() {
                return;
            }
        }
    }
}

struct TestSetup {
    _server_handle: tokio::task::JoinHandle<()>,
    client: Client,
    channel: Channel,
}

fn setup_server_and_client(rt: &Runtime) -> TestSetup {
    rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream));
            }
        });

        let client = Client::new(ConnectionConfig::new(format!("ws://{}/wsv2/bench", addr)));
        client.connect().await.unwrap();
        let channel = client.open("exec", "bench").await.unwrap();

        TestSetup {
            _server_handle: server_handle,
            client,
            channel,
        }
    })
}

fn bench_open_close(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_open_close");
    group.throughput(Throughput::Elements(1));

    group.bench_function("open_close", |b| {
        b.to_async(&rt).iter(|| async {
            let channel = setup.client.open("exec", "churn").await.unwrap();
            setup.client.close_channel(channel.id()).await.unwrap();
        });
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_get_output");

    for chunks in [1, 10, 100] {
        let args: Vec<String> = (0..chunks).map(|i| format!("chunk-{}\n", i)).collect();

        group.throughput(Throughput::Elements(chunks as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunks), &args, |b, args| {
            b.to_async(&rt).iter(|| async {
                let exec = replchan_protocol::Exec::new(args.iter().cloned());
                black_box(setup.channel.get_output(exec).await.unwrap())
            });
        });
    }

    group.finish();
}

fn bench_concurrent_channels(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup_server_and_client(&rt);
    let channels: Vec<Channel> = rt.block_on(async {
        let mut channels = Vec::new();
        for i in 0..8 {
            channels.push(setup.client.open("exec", &format!("worker-{}", i)).await.unwrap());
        }
        channels
    });

    let mut group = c.benchmark_group("e2e_concurrent");
    group.throughput(Throughput::Elements(channels.len() as u64));

    group.bench_function("8_channels", |b| {
        b.to_async(&rt).iter(|| async {
            let requests = channels
                .iter()
                .map(|channel| channel.get_output(replchan_protocol::Exec::new(["ping"])));
            for output in futures_util::future::join_all(requests).await {
                black_box(output.unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_open_close,
    bench_dispatch,
    bench_concurrent_channels
);

criterion_main!(benches);
