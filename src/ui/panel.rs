/// Side panel UI: the launcher list and the embedded site view

use crate::config::TimingConfig;
use crate::lifecycle::ViewState;
use crate::protocol::NavCommand;
use crate::session::{DisplayUrl, NavigationState};
use crate::settings::{NewSite, SidebarSettings, SiteUpdate};
use crate::site::BookmarkedSite;
use crate::storage::{load_settings, save_settings};
use crate::ui::components::{FrameToolbar, SiteRow};
use crate::ui::frame_host::{FrameHost, HostEvent};
use patternfly_yew::prelude::*;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{HtmlIFrameElement, HtmlInputElement};
use yew::prelude::*;

#[wasm_bindgen(module = "/panel.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn copyText(text: &str) -> Result<(), JsValue>;
}

fn persist(
    settings: UseStateHandle<SidebarSettings>,
    error: UseStateHandle<Option<String>>,
    next: SidebarSettings,
) {
    settings.set(next.clone());
    spawn_local(async move {
        if let Err(e) = save_settings(&next).await {
            log::error!("{}", e);
            error.set(Some(format!("Failed to save sites: {}", e)));
        }
    });
}

fn input_value(node: &NodeRef) -> String {
    node.cast::<HtmlInputElement>()
        .map(|input| input.value())
        .unwrap_or_default()
}

#[function_component(SidePanel)]
pub fn side_panel() -> Html {
    let settings = use_state(SidebarSettings::default);
    let loading = use_state(|| true);
    let error = use_state(|| None::<String>);
    let view = use_state(|| ViewState::List);
    let display_url = use_state(|| DisplayUrl::Loading);
    let nav_state = use_state(NavigationState::default);
    let toast = use_state(|| None::<String>);
    let name_ref = use_node_ref();
    let url_ref = use_node_ref();
    let iframe_ref = use_node_ref();
    let host = use_mut_ref(|| None::<FrameHost>);

    // Load sites on mount
    {
        let settings = settings.clone();
        let loading = loading.clone();
        use_effect_with((), move |_| {
            spawn_local(async move {
                settings.set(load_settings().await);
                loading.set(false);
            });
            || ()
        });
    }

    // Attach the frame runtime to the iframe once it is in the DOM
    {
        let host = host.clone();
        let iframe_ref = iframe_ref.clone();
        let error = error.clone();
        let view = view.clone();
        let display_url = display_url.clone();
        let nav_state = nav_state.clone();
        let toast = toast.clone();

        use_effect_with((), move |_| {
            let notify = Callback::from(move |event: HostEvent| match event {
                HostEvent::View(state) => view.set(state),
                HostEvent::Url(url) => display_url.set(url),
                HostEvent::Navigation(state) => nav_state.set(state),
                HostEvent::Toast(message) => toast.set(message),
            });

            match iframe_ref.cast::<HtmlIFrameElement>() {
                Some(iframe) => match FrameHost::attach(iframe, TimingConfig::default(), notify) {
                    Ok(frame_host) => *host.borrow_mut() = Some(frame_host),
                    Err(e) => error.set(Some(e.to_string())),
                },
                None => log::error!("site frame not mounted"),
            }

            move || {
                host.borrow_mut().take();
            }
        });
    }

    let on_open = {
        let host = host.clone();
        let toast = toast.clone();
        Callback::from(move |site: BookmarkedSite| {
            toast.set(None);
            if let Some(frame_host) = host.borrow().as_ref() {
                frame_host.open(&site);
            }
        })
    };

    let host_action = |action: fn(&FrameHost)| {
        let host = host.clone();
        Callback::from(move |_: MouseEvent| {
            if let Some(frame_host) = host.borrow().as_ref() {
                action(frame_host);
            }
        })
    };
    let on_list = host_action(|h| h.back_to_list());
    let on_back = host_action(|h| {
        h.navigate(NavCommand::Back);
    });
    let on_forward = host_action(|h| {
        h.navigate(NavCommand::Forward);
    });
    let on_refresh = host_action(|h| h.refresh());
    let on_open_tab = host_action(|h| h.open_current_in_tab());

    let on_copy = {
        let host = host.clone();
        Callback::from(move |_: MouseEvent| {
            let url = host.borrow().as_ref().and_then(|h| h.current_url());
            let Some(url) = url else { return };
            let host = host.clone();
            spawn_local(async move {
                match copyText(&url).await {
                    Ok(()) => {
                        if let Some(frame_host) = host.borrow().as_ref() {
                            frame_host.show_message("URL copied");
                        }
                    }
                    Err(e) => log::warn!("copy failed: {:?}", e),
                }
            });
        })
    };

    let on_add = {
        let settings = settings.clone();
        let error = error.clone();
        let name_ref = name_ref.clone();
        let url_ref = url_ref.clone();
        Callback::from(move |e: SubmitEvent| {
            e.prevent_default();
            let name = input_value(&name_ref);
            let url = input_value(&url_ref);

            let mut next = (*settings).clone();
            match next.add_site(NewSite::new(&name, &url).with_open_mode(next.display.default_open_mode)) {
                Ok(site) => log::info!("added {} ({})", site.name, site.url),
                Err(e) => {
                    error.set(Some(e.to_string()));
                    return;
                }
            }
            error.set(None);
            for node in [&name_ref, &url_ref] {
                if let Some(input) = node.cast::<HtmlInputElement>() {
                    input.set_value("");
                }
            }
            persist(settings.clone(), error.clone(), next);
        })
    };

    let on_remove = {
        let settings = settings.clone();
        let error = error.clone();
        Callback::from(move |site_id: String| {
            let mut next = (*settings).clone();
            if next.remove_site(&site_id) {
                persist(settings.clone(), error.clone(), next);
            }
        })
    };

    let on_move = {
        let settings = settings.clone();
        let error = error.clone();
        Callback::from(move |(site_id, delta): (String, isize)| {
            let mut next = (*settings).clone();
            let Some(index) = next.sorted_sites().iter().position(|s| s.id == site_id) else {
                return;
            };
            let Some(target) = index.checked_add_signed(delta) else {
                return;
            };
            if next.move_site(&site_id, target) {
                persist(settings.clone(), error.clone(), next);
            }
        })
    };

    let on_cycle_mode = {
        let settings = settings.clone();
        let error = error.clone();
        Callback::from(move |site_id: String| {
            let mut next = (*settings).clone();
            let Some(mode) = next.get_site(&site_id).map(|s| s.open_mode.next()) else {
                return;
            };
            let update = SiteUpdate {
                open_mode: Some(mode),
                ..SiteUpdate::default()
            };
            match next.update_site(&site_id, update) {
                Ok(()) => persist(settings.clone(), error.clone(), next),
                Err(e) => error.set(Some(e.to_string())),
            }
        })
    };

    let frame_visible = view.shows_frame();
    let display = &settings.display;
    let sites = settings.sorted_sites();
    let site_count = sites.len();

    html! {
        <div class="side-panel" style="display: flex; flex-direction: column; height: 100vh;">
            if let Some(message) = (*toast).clone() {
                <Alert r#type={AlertType::Info} title={message} inline={true}>
                </Alert>
            }
            if let Some(err) = (*error).clone() {
                <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                    {err}
                </Alert>
            }

            if frame_visible {
                <FrameToolbar
                    url_label={display_url.label().to_string()}
                    can_go_back={nav_state.can_go_back}
                    can_go_forward={nav_state.can_go_forward}
                    loading={matches!(*view, ViewState::Loading { .. })}
                    on_list={on_list}
                    on_back={on_back}
                    on_forward={on_forward}
                    on_refresh={on_refresh}
                    on_copy={on_copy}
                    on_open_tab={on_open_tab}
                />
            } else {
                <div class="site-list" style="flex: 1; overflow-y: auto;">
                    if *loading {
                        <div class="loading-text-center">
                            <Spinner />
                        </div>
                    } else if sites.is_empty() {
                        <p class="message-text" style="padding: 12px; color: #666;">
                            {"No sites yet. Add one below."}
                        </p>
                    } else {
                        {for sites.iter().enumerate().map(|(index, site)| html! {
                            <SiteRow
                                key={site.id.clone()}
                                site={(*site).clone()}
                                show_icon={display.show_icons}
                                show_name={display.show_names}
                                compact={display.compact}
                                can_move_up={index > 0}
                                can_move_down={index + 1 < site_count}
                                on_open={on_open.clone()}
                                on_move={on_move.clone()}
                                on_cycle_mode={on_cycle_mode.clone()}
                                on_remove={on_remove.clone()}
                            />
                        })}
                    }
                </div>

                <form class="add-site" onsubmit={on_add} style="display: flex; flex-direction: column; gap: 6px; padding: 8px; border-top: 1px solid #ddd;">
                    <input ref={name_ref} type="text" placeholder="Name (optional)" />
                    <input ref={url_ref} type="text" placeholder="example.com" />
                    <button type="submit">{"Add site"}</button>
                </form>
            }

            <iframe
                ref={iframe_ref}
                class="site-frame"
                title="Embedded site"
                style={if frame_visible { "flex: 1; width: 100%; border: none;" } else { "display: none;" }}
            />
        </div>
    }
}
