use crate::api::ApiClient;
use crate::config::EnvConfig;
use crate::models::{NotePatch, NoteSummary};
use crate::platform::BrowserRuntime;
use crate::state::AppState;
use crate::sync::{ConflictChoice, Interaction, SaveState, SyncEngine};
use leptos::ev;
use leptos::prelude::*;
use leptos::task::spawn_local;
use std::rc::Rc;

#[component]
pub fn App() -> impl IntoView {
    let state = AppState::new();

    let env = EnvConfig::new();
    let client = ApiClient::load_from_storage(env.api_url.clone());
    if !client.is_authenticated() {
        return view! { <SignIn api_url=env.api_url /> }.into_any();
    }

    let ui = Rc::new(state);
    let sync_engine = SyncEngine::new(
        env.sync.clone(),
        Rc::new(BrowserRuntime::new()),
        Rc::new(client),
        ui.clone(),
        ui,
    );
    sync_engine.start();
    let engine = StoredValue::new_local(sync_engine);

    // Global listeners feed the idle tracker and flush on page hide.
    let listeners = vec![
        window_event_listener(ev::keydown, move |_ev: web_sys::KeyboardEvent| {
            engine.with_value(|e| e.on_interaction(Interaction::Keystroke));
        }),
        window_event_listener(ev::click, move |_ev: web_sys::MouseEvent| {
            engine.with_value(|e| e.on_interaction(Interaction::Click));
        }),
        window_event_listener(ev::focus, move |_ev: web_sys::FocusEvent| {
            engine.with_value(|e| e.on_interaction(Interaction::Focus));
        }),
        window_event_listener(ev::pagehide, move |_ev: web_sys::PageTransitionEvent| {
            engine.with_value(|e| {
                e.flush_now();
            });
        }),
    ];
    let _listeners = StoredValue::new(listeners);

    let open_note = move |id: String| {
        state.loading.set(true);
        let engine = engine.get_value();
        spawn_local(async move {
            if let Err(e) = engine.select_note(&id).await {
                tracing::warn!(note_id = %id, error = %e, "could not open note");
            }
        });
    };

    let on_logout = move |_| {
        let engine = engine.get_value();
        spawn_local(async move {
            engine.logout().await;
            ApiClient::clear_storage();
            reload();
        });
    };

    let status = move || {
        if let Some(message) = state.error.get() {
            return message;
        }
        if state.idle.get() {
            return "Paused while idle".to_string();
        }
        if state.typing.get() {
            return "Editing…".to_string();
        }
        match state.save_state.get() {
            Some(SaveState::Saving) => "Saving…".to_string(),
            Some(SaveState::Saved) => "Saved".to_string(),
            Some(SaveState::Failed) => "Not saved".to_string(),
            None => String::new(),
        }
    };

    let conflict_sizes = move || {
        state.conflict.with(|c| {
            c.as_ref()
                .map(|c| {
                    format!(
                        "Yours: {} characters. Theirs: {} characters.",
                        c.local.chars().count(),
                        c.remote.content.chars().count()
                    )
                })
                .unwrap_or_default()
        })
    };

    view! {
        <div class="flex h-screen text-sm">
            <aside class="w-64 shrink-0 overflow-y-auto border-r">
                <div class="flex items-center justify-between px-3 py-2">
                    <span class="text-xs text-muted-foreground">"Notes"</span>
                    <button class="text-xs text-muted-foreground hover:underline" on:click=on_logout>
                        "Sign out"
                    </button>
                </div>
                <ul>
                    <For
                        each=move || state.index.get()
                        key=|n: &NoteSummary| (n.id.clone(), n.modified)
                        children=move |summary: NoteSummary| {
                            let id = summary.id.clone();
                            let active_id = summary.id.clone();
                            let is_active = move || {
                                state
                                    .current_note
                                    .with(|n| n.as_ref().is_some_and(|n| n.id == active_id))
                            };
                            let title = if summary.title.trim().is_empty() {
                                "Untitled".to_string()
                            } else {
                                summary.title.clone()
                            };
                            view! {
                                <li
                                    class="cursor-pointer truncate px-3 py-1 hover:bg-accent"
                                    class:font-semibold=is_active
                                    on:click=move |_| open_note(id.clone())
                                >
                                    {title}
                                </li>
                            }
                        }
                    />
                </ul>
            </aside>

            <main class="flex min-w-0 flex-1 flex-col">
                <Show
                    when=move || state.current_note.get().is_some()
                    fallback=|| view! { <div class="px-4 py-8 text-xs text-muted-foreground">"Select a note"</div> }
                >
                    <div class="flex items-center gap-2 border-b px-3 py-2">
                        <input
                            class="min-w-0 flex-1 bg-transparent text-lg font-semibold outline-none"
                            placeholder="Untitled"
                            prop:value=move || {
                                state.current_note.with(|n| n.as_ref().map(|n| n.title.clone()).unwrap_or_default())
                            }
                            on:change=move |ev: web_sys::Event| {
                                let title = event_target_value(&ev);
                                engine.with_value(|e| {
                                    e.update_metadata(NotePatch {
                                        title: Some(title),
                                        ..Default::default()
                                    });
                                });
                            }
                        />
                        <span class="text-xs text-muted-foreground">{status}</span>
                    </div>
                    <textarea
                        class="flex-1 resize-none p-3 font-mono outline-none"
                        prop:value=move || state.content.get()
                        prop:readOnly=move || state.loading.get()
                        on:input=move |ev: web_sys::Event| {
                            state.content.set(event_target_value(&ev));
                            engine.with_value(|e| e.on_content_changed());
                        }
                    />
                </Show>
            </main>

            <Show when=move || state.conflict.get().is_some() fallback=|| ().into_view()>
                <div class="fixed inset-0 flex items-center justify-center bg-black/40">
                    <div class="w-96 space-y-3 rounded-md border bg-card p-4">
                        <div class="font-semibold">"This note changed elsewhere"</div>
                        <div class="text-xs text-muted-foreground">
                            "Keep your version and overwrite the other one, or discard your recent edits."
                        </div>
                        <div class="text-xs text-muted-foreground">{conflict_sizes}</div>
                        <div class="flex justify-end gap-2">
                            <button
                                class="rounded-md border px-3 py-1"
                                on:click=move |_| state.resolve_conflict(ConflictChoice::TakeTheirs)
                            >
                                "Take theirs"
                            </button>
                            <button
                                class="rounded-md border bg-primary px-3 py-1 text-primary-foreground"
                                on:click=move |_| state.resolve_conflict(ConflictChoice::KeepMine)
                            >
                                "Keep mine"
                            </button>
                        </div>
                    </div>
                </div>
            </Show>
        </div>
    }
    .into_any()
}

fn reload() {
    if let Some(win) = web_sys::window() {
        let _ = win.location().reload();
    }
}

/// Token entry shown when no session is stored.
#[component]
fn SignIn(api_url: String) -> impl IntoView {
    let token = RwSignal::new(String::new());
    let api_url = StoredValue::new(api_url);

    let on_sign_in = move |_| {
        let value = token.get_untracked().trim().to_string();
        if value.is_empty() {
            return;
        }
        let mut client = ApiClient::load_from_storage(api_url.get_value());
        client.set_token(value);
        client.save_to_storage();
        reload();
    };

    view! {
        <div class="mx-auto mt-24 w-80 space-y-3 text-sm">
            <div class="font-semibold">"Sign in"</div>
            <input
                class="w-full rounded-md border px-3 py-1"
                type="password"
                placeholder="Access token"
                prop:value=move || token.get()
                on:input=move |ev: web_sys::Event| token.set(event_target_value(&ev))
            />
            <button class="w-full rounded-md border bg-primary px-3 py-1 text-primary-foreground" on:click=on_sign_in>
                "Continue"
            </button>
        </div>
    }
}
