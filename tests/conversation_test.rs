mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use classwatch::conversation::{Conversation, ConversationState};
use classwatch::dispatcher::{Dispatcher, Handler, Middleware, MiddlewareMode};
use classwatch::error::Result;
use classwatch::store::User;
use classwatch::types::{HandleContext, OriginatorId};
use common::{accept, chat_of, finish, reject, text, RecordingSender};
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Attaches a user built from the update's originator.
struct AttachUser;

#[async_trait]
impl Middleware for AttachUser {
    fn name(&self) -> &str {
        "attach_user"
    }

    fn mode(&self) -> MiddlewareMode {
        MiddlewareMode::Sync
    }

    async fn process(&self, ctx: &mut HandleContext) -> Result<()> {
        if let (Some(profile), Some(chat)) = (ctx.update.profile(), ctx.update.chat()) {
            ctx.user = Some(User::from_profile(profile, chat));
        }
        Ok(())
    }
}

fn originator_of(ctx: &HandleContext) -> i64 {
    ctx.update.originator().map(|id| id.0).unwrap_or_default()
}

async fn dispatch_and_wait(dispatcher: &Dispatcher, update: classwatch::types::Update) -> bool {
    match dispatcher.dispatch(update).await {
        Some(handle) => {
            handle.await.unwrap();
            true
        }
        None => false,
    }
}

#[tokio::test]
async fn test_two_step_conversation_finalizes_with_results() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&finished);

    let conversation = Conversation::builder("test")
        .trigger("test")
        .step(|_ctx: HandleContext, _state: ConversationState<String>| async move {
            accept("Handler 1".to_string())
        })
        .step(|ctx: HandleContext, state: ConversationState<String>| async move {
            assert_eq!(state.get(0).unwrap(), "Handler 1");
            accept(ctx.user.map(|u| u.name).unwrap_or_default())
        })
        .finalizer(move |_ctx: HandleContext, state: ConversationState<String>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().await.push(state.into_inner());
                finish()
            }
        })
        .build()
        .unwrap();

    let mut dispatcher = Dispatcher::new(RecordingSender::new());
    dispatcher.add_middleware(Box::new(AttachUser));
    dispatcher.add_handler(Box::new(conversation));

    assert!(dispatch_and_wait(&dispatcher, text(2, "/test")).await);
    assert!(finished.lock().await.is_empty());
    assert!(dispatch_and_wait(&dispatcher, text(2, "bla")).await);

    let finished = finished.lock().await;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0], vec!["Handler 1".to_string(), "user2".to_string()]);
}

#[tokio::test]
async fn test_concurrent_triggers_create_one_instance() {
    let conversation = Arc::new(
        Conversation::builder("test")
            .trigger("test")
            .step(|_ctx: HandleContext, _state: ConversationState<u8>| async move {
                accept(1)
            })
            .step(|_ctx: HandleContext, _state: ConversationState<u8>| async move {
                accept(2)
            })
            .finalizer(|_ctx: HandleContext, _state: ConversationState<u8>| async move { finish() })
            .build()
            .unwrap(),
    );
    let sender = RecordingSender::new();

    let mut tasks = Vec::new();
    for _ in 0..64 {
        let conversation = Arc::clone(&conversation);
        let ctx = HandleContext::new(text(9, "/test"), sender.clone());
        tasks.push(tokio::spawn(async move { conversation.is_match(&ctx) }));
    }
    for task in tasks {
        assert!(task.await.unwrap());
    }

    assert_eq!(conversation.registry().len(), 1);
    assert!(conversation.is_active(OriginatorId(9)));
}

#[tokio::test]
async fn test_rejected_step_is_retried() {
    let step_calls = Arc::new(AtomicUsize::new(0));
    let finalized = Arc::new(AtomicUsize::new(0));

    let calls = Arc::clone(&step_calls);
    let done = Arc::clone(&finalized);
    let conversation = Arc::new(
        Conversation::builder("retry")
            .trigger("start")
            .step(|_ctx: HandleContext, _state: ConversationState<u32>| async move {
                accept(0)
            })
            .step(move |_ctx: HandleContext, _state: ConversationState<u32>| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        reject()
                    } else {
                        accept(1)
                    }
                }
            })
            .finalizer(move |_ctx: HandleContext, state: ConversationState<u32>| {
                let done = Arc::clone(&done);
                async move {
                    assert_eq!(state.into_inner(), vec![0, 1]);
                    done.fetch_add(1, Ordering::SeqCst);
                    finish()
                }
            })
            .build()
            .unwrap(),
    );

    let mut dispatcher = Dispatcher::new(RecordingSender::new());
    dispatcher.add_shared_handler(conversation.clone());
    let instance = || conversation.registry().get(OriginatorId(3)).unwrap();

    assert!(dispatch_and_wait(&dispatcher, text(3, "/start")).await);
    assert_eq!(instance().progress().await, 1);

    assert!(dispatch_and_wait(&dispatcher, text(3, "first try")).await);
    assert_eq!(instance().progress().await, 1);
    assert_eq!(finalized.load(Ordering::SeqCst), 0);

    assert!(dispatch_and_wait(&dispatcher, text(3, "second try")).await);
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
    assert_eq!(step_calls.load(Ordering::SeqCst), 2);
    assert!(!conversation.is_active(OriginatorId(3)));
}

#[tokio::test]
async fn test_finished_conversation_starts_fresh() {
    let first_step_states = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&first_step_states);

    let conversation = Arc::new(
        Conversation::builder("fresh")
            .trigger("go")
            .step(move |_ctx: HandleContext, state: ConversationState<usize>| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().await.push(state.len());
                    accept(7)
                }
            })
            .step(|_ctx: HandleContext, state: ConversationState<usize>| async move {
                accept(state.len())
            })
            .finalizer(|_ctx: HandleContext, _state: ConversationState<usize>| async move { finish() })
            .build()
            .unwrap(),
    );

    let mut dispatcher = Dispatcher::new(RecordingSender::new());
    dispatcher.add_shared_handler(conversation.clone());

    assert!(dispatch_and_wait(&dispatcher, text(4, "/go")).await);
    assert!(dispatch_and_wait(&dispatcher, text(4, "answer")).await);
    assert!(conversation.registry().is_empty());

    // Plain text is no longer claimed once the conversation is over.
    assert!(!dispatch_and_wait(&dispatcher, text(4, "answer")).await);

    assert!(dispatch_and_wait(&dispatcher, text(4, "/go")).await);
    assert_eq!(*first_step_states.lock().await, vec![0, 0]);
    assert_eq!(
        conversation
            .registry()
            .get(OriginatorId(4))
            .unwrap()
            .progress()
            .await,
        1
    );
}

#[tokio::test]
async fn test_many_originators_keep_their_own_state() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&finished);

    let conversation = Conversation::builder("isolation")
        .trigger("test")
        .step(|ctx: HandleContext, _state: ConversationState<i64>| async move {
            accept(ctx.user.map(|u| u.id.0).unwrap_or(-1))
        })
        .step(|ctx: HandleContext, _state: ConversationState<i64>| async move {
            accept(originator_of(&ctx))
        })
        .finalizer(move |ctx: HandleContext, state: ConversationState<i64>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock()
                    .await
                    .push((originator_of(&ctx), state.into_inner()));
                finish()
            }
        })
        .build()
        .unwrap();

    let mut dispatcher = Dispatcher::new(RecordingSender::new());
    dispatcher.add_middleware(Box::new(AttachUser));
    dispatcher.add_handler(Box::new(conversation));
    let dispatcher = Arc::new(dispatcher);

    let mut tasks = Vec::new();
    for id in 0..200 {
        let dispatcher = Arc::clone(&dispatcher);
        tasks.push(tokio::spawn(async move {
            assert!(dispatch_and_wait(&dispatcher, text(id, "/test")).await);
            let delay = rand::thread_rng().gen_range(0..50);
            sleep(Duration::from_millis(delay)).await;
            assert!(dispatch_and_wait(&dispatcher, text(id, "bla")).await);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut finished = finished.lock().await.clone();
    finished.sort();
    assert_eq!(finished.len(), 200);
    for (expected, (originator, values)) in finished.into_iter().enumerate() {
        assert_eq!(originator, expected as i64);
        assert_eq!(values, vec![originator, originator]);
    }
}

#[tokio::test]
async fn test_update_waiting_on_finished_instance_is_dropped() {
    let step_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&step_calls);

    let conversation = Arc::new(
        Conversation::builder("slow")
            .trigger("go")
            .step(move |_ctx: HandleContext, _state: ConversationState<()>| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    accept(())
                }
            })
            .finalizer(|_ctx: HandleContext, _state: ConversationState<()>| async move {
                sleep(Duration::from_millis(100)).await;
                finish()
            })
            .build()
            .unwrap(),
    );

    let mut dispatcher = Dispatcher::new(RecordingSender::new());
    dispatcher.add_shared_handler(conversation.clone());

    let first = dispatcher.dispatch(text(5, "/go")).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    // Still registered while the finalizer runs, so this one is claimed and
    // has to wait for the lock.
    let second = dispatcher.dispatch(text(5, "too late")).await.unwrap();

    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(step_calls.load(Ordering::SeqCst), 1);
    assert!(conversation.registry().is_empty());
}

#[tokio::test]
async fn test_failing_finalizer_still_ends_conversation() {
    let conversation = Arc::new(
        Conversation::builder("failing")
            .trigger("go")
            .step(|_ctx: HandleContext, _state: ConversationState<u8>| async move {
                accept(1)
            })
            .finalizer(|ctx: HandleContext, _state: ConversationState<u8>| async move {
                ctx.respond("Er ging iets fout").await;
                Err::<(), _>(classwatch::BotError::store_error("disk full"))
            })
            .build()
            .unwrap(),
    );
    let sender = RecordingSender::new();
    let ctx = HandleContext::new(text(6, "/go"), sender.clone());

    assert!(conversation.is_match(&ctx));
    let result = conversation.handle(ctx).await;

    assert!(matches!(
        result,
        Err(classwatch::BotError::ConversationError { .. })
    ));
    assert!(conversation.registry().is_empty());
    assert_eq!(sender.texts().await, vec!["Er ging iets fout".to_string()]);
    assert_eq!(sender.last().await.unwrap().chat, chat_of(6));
}

#[tokio::test]
async fn test_panicking_step_releases_instance() {
    let panicked = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&panicked);
    let finalized = Arc::new(AtomicUsize::new(0));
    let done = Arc::clone(&finalized);

    let conversation = Arc::new(
        Conversation::builder("panicky")
            .trigger("go")
            .step(|_ctx: HandleContext, _state: ConversationState<u8>| async move {
                accept(0)
            })
            .step(move |_ctx: HandleContext, _state: ConversationState<u8>| {
                let flag = Arc::clone(&flag);
                async move {
                    if flag.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("step blew up");
                    }
                    accept(1)
                }
            })
            .finalizer(move |_ctx: HandleContext, _state: ConversationState<u8>| {
                let done = Arc::clone(&done);
                async move {
                    done.fetch_add(1, Ordering::SeqCst);
                    finish()
                }
            })
            .build()
            .unwrap(),
    );

    let mut dispatcher = Dispatcher::new(RecordingSender::new());
    dispatcher.add_shared_handler(conversation.clone());

    assert!(dispatch_and_wait(&dispatcher, text(7, "/go")).await);
    assert!(dispatch_and_wait(&dispatcher, text(7, "boom")).await);
    assert_eq!(
        conversation
            .registry()
            .get(OriginatorId(7))
            .unwrap()
            .progress()
            .await,
        1
    );

    assert!(dispatch_and_wait(&dispatcher, text(7, "again")).await);
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
    assert!(conversation.registry().is_empty());
}

#[tokio::test]
async fn test_handle_without_instance_is_a_no_op() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let conversation = Conversation::builder("orphan")
        .trigger("go")
        .step(move |_ctx: HandleContext, _state: ConversationState<u8>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                accept(0)
            }
        })
        .finalizer(|_ctx: HandleContext, _state: ConversationState<u8>| async move { finish() })
        .build()
        .unwrap();

    let ctx = HandleContext::new(text(8, "hello"), RecordingSender::new());
    assert!(!conversation.is_match(&ctx));
    assert!(conversation.handle(ctx).await.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_builder_rejects_incomplete_definitions() {
    let no_steps = Conversation::<u8>::builder("empty")
        .trigger("go")
        .finalizer(|_ctx: HandleContext, _state: ConversationState<u8>| async move { finish() })
        .build();
    assert!(matches!(
        no_steps,
        Err(classwatch::BotError::ConfigError { .. })
    ));

    let no_trigger = Conversation::builder("silent")
        .step(|_ctx: HandleContext, _state: ConversationState<u8>| async move {
            accept(0)
        })
        .finalizer(|_ctx: HandleContext, _state: ConversationState<u8>| async move { finish() })
        .build();
    assert!(no_trigger.is_err());
}
