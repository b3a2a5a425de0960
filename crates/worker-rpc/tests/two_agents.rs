//! Integration tests running two agents against each other.
//!
//! Every test spawns a "main" agent that serves endpoints and a "worker"
//! agent that calls them, each on its own thread, connected by one channel.

use serde_json::{json, Value};
use std::future::Future;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use worker_rpc::{
    message_channel, AgentThread, Endpoint, Handler, HandlerTarget, Invocation, Reply, Request,
    Rpc, RpcError, Transferable,
};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Serve with `serve` on "main", run `call` on "worker", return what `call` produced.
fn run_pair<S, SF, C, CF, T>(serve: S, call: C) -> T
where
    S: FnOnce(Rpc) -> SF + Send + 'static,
    SF: Future<Output = ()> + 'static,
    C: FnOnce(Rpc) -> CF + Send + 'static,
    CF: Future<Output = T> + 'static,
    T: Send + 'static,
{
    let (main_port, worker_port) = message_channel();
    let (tx, rx) = mpsc::channel();

    let main = AgentThread::spawn("main", main_port, serve).expect("Failed to spawn main");
    let worker = AgentThread::spawn("worker", worker_port, move |rpc| async move {
        let outcome = call(rpc).await;
        let _ = tx.send(outcome);
    })
    .expect("Failed to spawn worker");

    let outcome = rx.recv_timeout(TIMEOUT).expect("worker did not finish");
    worker.join().unwrap();
    main.join().unwrap();
    outcome
}

fn sum_handler() -> Handler {
    Handler::from_fn(|req: Request| {
        let a: i64 = req.arg(0)?;
        let b: i64 = req.arg(1)?;
        Ok(json!(a + b))
    })
}

async fn wait_for_pending(rpc: &Rpc, endpoint: &Endpoint, count: usize) {
    while rpc.pending_messages(endpoint) < count {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[test]
fn test_async_ping_resolves_to_pong() {
    let ping = Endpoint::async_call("ping");
    let served = ping.clone();

    let result = run_pair(
        move |rpc| async move {
            rpc.register_handler(&served, Handler::from_fn(|_req: Request| Ok(json!("pong"))));
        },
        move |rpc| async move {
            let call = rpc.create_call(&ping);
            call(vec![])?.into_pending()?.value().await
        },
    );

    assert_eq!(result.unwrap(), json!("pong"));
}

#[test]
fn test_sync_sum_blocks_until_handler_answers() {
    let sum = Endpoint::sync("sum", 64);
    let served = sum.clone();

    let (result, elapsed) = run_pair(
        move |rpc| async move {
            rpc.register_handler(
                &served,
                Handler::new(|req: Request| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let a: i64 = req.arg(0)?;
                    let b: i64 = req.arg(1)?;
                    Ok(json!(a + b))
                }),
            );
        },
        move |rpc| async move {
            let started = Instant::now();
            let result = rpc.invoke(&sum, vec![json!(2), json!(3)], Vec::new());
            (result.map(Invocation::into_value), started.elapsed())
        },
    );

    assert_eq!(result.unwrap(), Some(json!(5)));
    assert!(elapsed >= Duration::from_millis(50));
}

#[test]
fn test_sync_round_trip_preserves_structure() {
    let echo = Endpoint::sync("echo", 256);
    let served = echo.clone();
    let value = json!({
        "name": "view",
        "size": [320, 240],
        "visible": true,
        "ratio": 1.5,
        "parent": null,
        "label": "héllo ✓"
    });
    let sent = value.clone();

    let result = run_pair(
        move |rpc| async move {
            rpc.register_handler(
                &served,
                Handler::from_fn(|mut req: Request| Ok(req.args.remove(0))),
            );
        },
        move |rpc| async move { rpc.invoke(&echo, vec![sent], Vec::new()) },
    );

    assert_eq!(result.unwrap().into_value(), Some(value));
}

#[test]
fn test_sync_void_returns_nothing_after_handler_ran() {
    let log = Endpoint::sync_void("consoleLogSync");
    let served = log.clone();
    let (ran_tx, ran_rx) = mpsc::channel();

    let result = run_pair(
        move |rpc| async move {
            rpc.register_handler(
                &served,
                Handler::from_fn(move |req: Request| {
                    ran_tx.send(req.arg::<String>(0)?)?;
                    Ok(())
                }),
            );
        },
        move |rpc| async move { rpc.invoke(&log, vec![json!("hello world")], Vec::new()) },
    );

    assert!(matches!(result.unwrap(), Invocation::Completed(None)));
    assert_eq!(ran_rx.recv_timeout(TIMEOUT).unwrap(), "hello world");
}

#[test]
fn test_messages_before_registration_replay_in_order() {
    let evt = Endpoint::async_void("evt");
    let collected = Endpoint::async_call("collected");
    let (served_evt, served_collected) = (evt.clone(), collected.clone());

    let result = run_pair(
        move |rpc| async move {
            wait_for_pending(&rpc, &served_evt, 3).await;

            let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
            let sink = seen.clone();
            rpc.register_handler(
                &served_evt,
                Handler::from_fn(move |req: Request| {
                    sink.borrow_mut().push(Value::Array(req.args));
                    Ok(())
                }),
            );

            // Snapshot taken the moment registration returns.
            let snapshot = Value::Array(seen.borrow().clone());
            rpc.register_handler(
                &served_collected,
                Handler::from_fn(move |_req: Request| Ok(snapshot.clone())),
            );
        },
        move |rpc| async move {
            for n in 1..=3 {
                rpc.invoke(&evt, vec![json!(n), json!(format!("evt-{n}"))], Vec::new())?;
            }
            rpc.invoke(&collected, vec![], Vec::new())?
                .into_pending()?
                .value()
                .await
        },
    );

    assert_eq!(
        result.unwrap(),
        json!([[1, "evt-1"], [2, "evt-2"], [3, "evt-3"]])
    );
}

#[test]
fn test_sync_handler_error_fails_the_call() {
    let explode = Endpoint::sync("throwErrorSync", 64);
    let served = explode.clone();

    let result = run_pair(
        move |rpc| async move {
            rpc.register_handler(
                &served,
                Handler::from_fn(|_req: Request| Err::<Value, _>(anyhow::anyhow!("kaboom"))),
            );
        },
        move |rpc| async move { rpc.invoke(&explode, vec![], Vec::new()) },
    );

    match result {
        Err(RpcError::CallFailed { endpoint }) => assert_eq!(endpoint, "throwErrorSync"),
        other => panic!("Expected CallFailed, got: {:?}", other),
    }
}

#[test]
fn test_async_handler_error_rejects_the_future() {
    let explode = Endpoint::async_call("throwError");
    let served = explode.clone();

    let result = run_pair(
        move |rpc| async move {
            rpc.register_handler(
                &served,
                Handler::new(|_req: Request| async { Err::<Value, _>(anyhow::anyhow!("nope")) }),
            );
        },
        move |rpc| async move {
            rpc.invoke(&explode, vec![], Vec::new())?
                .into_pending()?
                .await
                .map(Reply::into_value)
        },
    );

    assert!(matches!(result, Err(RpcError::CallFailed { .. })));
}

#[test]
fn test_sync_result_overflow_fails_the_call() {
    let tiny = Endpoint::sync("tiny", 4);
    let served = tiny.clone();

    let result = run_pair(
        move |rpc| async move {
            rpc.register_handler(&served, Handler::from_fn(|_req: Request| Ok(json!("longer than four"))));
        },
        move |rpc| async move { rpc.invoke(&tiny, vec![], Vec::new()) },
    );

    assert!(matches!(result, Err(RpcError::CallFailed { .. })));
}

#[test]
fn test_out_of_order_replies_resolve_their_own_futures() {
    let delay = Endpoint::async_call("delay");
    let served = delay.clone();

    let (ids, slow, fast) = run_pair(
        move |rpc| async move {
            rpc.register_handler(
                &served,
                Handler::new(|req: Request| async move {
                    let ms: u64 = req.arg(0)?;
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(req.args[1].clone())
                }),
            );
        },
        move |rpc| async move {
            let slow = rpc
                .invoke(&delay, vec![json!(80), json!("slow")], Vec::new())
                .and_then(Invocation::into_pending)
                .unwrap();
            let fast = rpc
                .invoke(&delay, vec![json!(1), json!("fast")], Vec::new())
                .and_then(Invocation::into_pending)
                .unwrap();
            let ids = (slow.ret_id().to_string(), fast.ret_id().to_string());

            // The fast reply arrives first and must not settle the slow call.
            let fast = fast.value().await;
            let slow = slow.value().await;
            (ids, slow, fast)
        },
    );

    assert_eq!(ids, ("ret_worker_0".to_string(), "ret_worker_1".to_string()));
    assert_eq!(slow.unwrap(), json!("slow"));
    assert_eq!(fast.unwrap(), json!("fast"));
}

#[test]
fn test_every_async_call_settles_exactly_once() {
    let maybe = Endpoint::async_call("maybe");
    let served = maybe.clone();

    let outcomes = run_pair(
        move |rpc| async move {
            rpc.register_handler(
                &served,
                Handler::from_fn(|req: Request| {
                    let n: i64 = req.arg(0)?;
                    if n % 3 == 0 {
                        anyhow::bail!("{} is divisible by three", n);
                    }
                    Ok(json!(n * 10))
                }),
            );
        },
        move |rpc| async move {
            let pending: Vec<_> = (0..30)
                .map(|n| {
                    rpc.invoke(&maybe, vec![json!(n)], Vec::new())
                        .and_then(Invocation::into_pending)
                        .unwrap()
                })
                .collect();
            futures::future::join_all(pending.into_iter().map(|p| p.value())).await
        },
    );

    assert_eq!(outcomes.len(), 30);
    for (n, outcome) in outcomes.into_iter().enumerate() {
        if n % 3 == 0 {
            assert!(matches!(outcome, Err(RpcError::CallFailed { .. })), "call {n}");
        } else {
            assert_eq!(outcome.unwrap(), json!(n * 10), "call {n}");
        }
    }
}

#[test]
fn test_second_registration_wins() {
    let which = Endpoint::async_call("which");
    let served = which.clone();

    let result = run_pair(
        move |rpc| async move {
            rpc.register_handler(&served, Handler::from_fn(|_req: Request| Ok(json!("first"))));
            rpc.register_handler(&served, Handler::from_fn(|_req: Request| Ok(json!("second"))));
        },
        move |rpc| async move {
            rpc.invoke(&which, vec![], Vec::new())?
                .into_pending()?
                .value()
                .await
        },
    );

    assert_eq!(result.unwrap(), json!("second"));
}

#[test]
fn test_removed_handler_buffers_until_reregistered() {
    let toggle = Endpoint::async_call("toggle");
    let served = toggle.clone();

    let result = run_pair(
        move |rpc| async move {
            rpc.register_handler(&served, Handler::from_fn(|_req: Request| Ok(json!("old"))));
            rpc.remove_handler(&served);
            wait_for_pending(&rpc, &served, 1).await;
            rpc.register_handler(&served, Handler::from_fn(|_req: Request| Ok(json!("new"))));
        },
        move |rpc| async move {
            rpc.invoke(&toggle, vec![], Vec::new())?
                .into_pending()?
                .value()
                .await
        },
    );

    assert_eq!(result.unwrap(), json!("new"));
}

#[test]
fn test_lazy_handler_registers_on_first_assignment() {
    let test_lazy = Endpoint::async_call("testLazy");
    let served = test_lazy.clone();
    let (swap_tx, swap_rx) = tokio::sync::oneshot::channel::<()>();
    let (swapped_tx, swapped_rx) = tokio::sync::oneshot::channel::<()>();

    let (first, second) = run_pair(
        move |rpc| async move {
            let target = HandlerTarget::new();
            rpc.register_handler_lazy(&served, &target, "testLazy");
            assert!(!rpc.has_handler(&served));

            wait_for_pending(&rpc, &served, 1).await;
            target.set("testLazy", sum_handler());

            let _ = swap_rx.await;
            target.set("testLazy", Handler::from_fn(|_req: Request| Ok(json!(100))));
            let _ = swapped_tx.send(());
        },
        move |rpc| async move {
            let call = rpc.create_call(&test_lazy);
            let first = call(vec![json!(2), json!(3)])
                .and_then(Invocation::into_pending)
                .unwrap()
                .value()
                .await;

            let _ = swap_tx.send(());
            let _ = swapped_rx.await;
            let second = call(vec![json!(2), json!(3)])
                .and_then(Invocation::into_pending)
                .unwrap()
                .value()
                .await;
            (first, second)
        },
    );

    assert_eq!(first.unwrap(), json!(5));
    assert_eq!(second.unwrap(), json!(100));
}

#[test]
fn test_lazy_handler_with_filled_slot_registers_immediately() {
    let test_lazy = Endpoint::async_call("testLazy");
    let served = test_lazy.clone();
    let (registered_tx, registered_rx) = mpsc::channel();

    let result = run_pair(
        move |rpc| async move {
            let target = HandlerTarget::new();
            target.set("testLazy", sum_handler());
            rpc.register_handler_lazy(&served, &target, "testLazy");
            let _ = registered_tx.send((rpc.has_handler(&served), rpc.pending_total()));
        },
        move |rpc| async move {
            rpc.invoke(&test_lazy, vec![json!(4), json!(5)], Vec::new())?
                .into_pending()?
                .value()
                .await
        },
    );

    assert_eq!(registered_rx.recv_timeout(TIMEOUT).unwrap(), (true, 0));
    assert_eq!(result.unwrap(), json!(9));
}

#[test]
fn test_panicking_handlers_fail_the_call_and_agent_keeps_serving() {
    let boom = Endpoint::async_call("boom");
    let boom_later = Endpoint::async_call("boomLater");
    let boom_sync = Endpoint::sync("boomSync", 64);
    let ok = Endpoint::async_call("ok");
    let served = (boom.clone(), boom_later.clone(), boom_sync.clone(), ok.clone());

    let (first, later, blocking, after) = run_pair(
        move |rpc| async move {
            let (boom, boom_later, boom_sync, ok) = served;
            rpc.register_handler(
                &boom,
                Handler::from_fn(|_req: Request| -> anyhow::Result<Value> { panic!("boom") }),
            );
            rpc.register_handler(
                &boom_later,
                Handler::new(|_req: Request| async {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    if true {
                        panic!("boom later");
                    }
                    Ok::<_, anyhow::Error>(json!(0))
                }),
            );
            rpc.register_handler(
                &boom_sync,
                Handler::from_fn(|_req: Request| -> anyhow::Result<Value> { panic!("boom sync") }),
            );
            rpc.register_handler(&ok, Handler::from_fn(|_req: Request| Ok(json!("ok"))));
        },
        move |rpc| async move {
            let first = match rpc.invoke(&boom, vec![], Vec::new()).and_then(Invocation::into_pending) {
                Ok(pending) => pending.value().await,
                Err(e) => Err(e),
            };
            let later = match rpc.invoke(&boom_later, vec![], Vec::new()).and_then(Invocation::into_pending) {
                Ok(pending) => pending.value().await,
                Err(e) => Err(e),
            };
            let blocking = rpc.invoke(&boom_sync, vec![], Vec::new()).map(Invocation::into_value);
            let after = match rpc.invoke(&ok, vec![], Vec::new()).and_then(Invocation::into_pending) {
                Ok(pending) => pending.value().await,
                Err(e) => Err(e),
            };
            (first, later, blocking, after)
        },
    );

    assert!(matches!(first, Err(RpcError::CallFailed { .. })), "{:?}", first);
    assert!(matches!(later, Err(RpcError::CallFailed { .. })), "{:?}", later);
    assert!(matches!(blocking, Err(RpcError::CallFailed { .. })), "{:?}", blocking);
    assert_eq!(after.unwrap(), json!("ok"));
}

#[test]
fn test_ref_handler_answers_null_while_slot_is_empty() {
    let run = Endpoint::async_call("run");
    let served = run.clone();

    let result = run_pair(
        move |rpc| async move {
            let target = HandlerTarget::new();
            rpc.register_handler_ref(&served, &target, "run");
        },
        move |rpc| async move {
            rpc.invoke(&run, vec![], Vec::new())?
                .into_pending()?
                .value()
                .await
        },
    );

    assert_eq!(result.unwrap(), Value::Null);
}

#[test]
fn test_transferables_move_both_ways() {
    let upload = Endpoint::async_with_transfer("upload");
    let served = upload.clone();

    let (data, returned) = run_pair(
        move |rpc| async move {
            rpc.register_handler(
                &served,
                Handler::from_fn(|mut req: Request| {
                    let bytes: Vec<u8> = req
                        .take_transfer()
                        .ok_or_else(|| anyhow::anyhow!("no buffer transferred"))?;
                    let doubled: Vec<u8> = bytes.iter().map(|b| b * 2).collect();
                    Ok(Reply::with_transfer(
                        json!(bytes.len()),
                        vec![Transferable::new(doubled)],
                    ))
                }),
            );
        },
        move |rpc| async move {
            let mut reply = rpc
                .invoke(&upload, vec![], vec![Transferable::new(vec![1u8, 2, 3])])
                .and_then(Invocation::into_pending)
                .unwrap()
                .await
                .unwrap();
            let returned: Option<Vec<u8>> = reply.take_transfer();
            (reply.data, returned)
        },
    );

    assert_eq!(data, json!(3));
    assert_eq!(returned, Some(vec![2, 4, 6]));
}

#[test]
fn test_callbackify_hands_value_to_callback() {
    let add = Endpoint::async_call("add");
    let served = add.clone();

    let result = run_pair(
        move |rpc| async move {
            rpc.register_handler(&served, sum_handler());
        },
        move |rpc| async move {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let add_cb = rpc.create_callbackify(&add);
            add_cb(vec![json!(20), json!(22)], move |value: Value| {
                let _ = tx.send(value);
            });
            rx.await.unwrap()
        },
    );

    assert_eq!(result, json!(42));
}

#[test]
fn test_both_agents_serve_and_call() {
    let (main_port, worker_port) = message_channel();
    let (tx, rx) = mpsc::channel();
    let add = Endpoint::async_call("add");
    let mul = Endpoint::sync("mul", 32);

    let (main_add, main_mul) = (add.clone(), mul.clone());
    let main_tx = tx.clone();
    let main = AgentThread::spawn("main", main_port, move |rpc| async move {
        rpc.register_handler(&main_add, sum_handler());
        let product = rpc
            .create_call(&main_mul)(vec![json!(6), json!(7)])
            .map(Invocation::into_value);
        let _ = main_tx.send(("main", product.ok().flatten()));
    })
    .unwrap();

    let worker = AgentThread::spawn("worker", worker_port, move |rpc| async move {
        rpc.register_handler(
            &mul,
            Handler::from_fn(|req: Request| Ok(json!(req.arg::<i64>(0)? * req.arg::<i64>(1)?))),
        );
        let total = rpc
            .invoke(&add, vec![json!(1), json!(2)], Vec::new())
            .and_then(Invocation::into_pending);
        let total = match total {
            Ok(pending) => pending.value().await.ok(),
            Err(_) => None,
        };
        let _ = tx.send(("worker", total));
    })
    .unwrap();

    let mut results = vec![
        rx.recv_timeout(TIMEOUT).unwrap(),
        rx.recv_timeout(TIMEOUT).unwrap(),
    ];
    results.sort_by_key(|(who, _)| *who);
    assert_eq!(results, vec![("main", Some(json!(42))), ("worker", Some(json!(3)))]);

    worker.join().unwrap();
    main.join().unwrap();
}
