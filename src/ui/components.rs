/// Reusable UI components for the side panel

use crate::site::{BookmarkedSite, IconType};
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct SiteIconProps {
    pub site: BookmarkedSite,
}

#[function_component(SiteIcon)]
pub fn site_icon(props: &SiteIconProps) -> Html {
    let style = "width: 20px; height: 20px; flex-shrink: 0; display: flex; align-items: center; justify-content: center;";

    match (props.site.icon_type, props.site.icon_source()) {
        (IconType::Emoji, Some(emoji)) => html! {
            <span style={style}>{emoji}</span>
        },
        (IconType::Favicon, Some(src)) => html! {
            <img style={style} src={src} alt="" />
        },
        _ => html! { <span style={style}></span> },
    }
}

#[derive(Properties, PartialEq)]
pub struct SiteRowProps {
    pub site: BookmarkedSite,
    pub show_icon: bool,
    pub show_name: bool,
    pub compact: bool,
    pub can_move_up: bool,
    pub can_move_down: bool,
    pub on_open: Callback<BookmarkedSite>,
    pub on_move: Callback<(String, isize)>,
    pub on_cycle_mode: Callback<String>,
    pub on_remove: Callback<String>,
}

#[function_component(SiteRow)]
pub fn site_row(props: &SiteRowProps) -> Html {
    let site = props.site.clone();
    let id = site.id.clone();

    let onclick = {
        let on_open = props.on_open.clone();
        let site = site.clone();
        Callback::from(move |_: MouseEvent| on_open.emit(site.clone()))
    };
    let move_by = |delta: isize| {
        let on_move = props.on_move.clone();
        let id = id.clone();
        Callback::from(move |_: MouseEvent| on_move.emit((id.clone(), delta)))
    };
    let on_cycle = {
        let on_cycle_mode = props.on_cycle_mode.clone();
        let id = id.clone();
        Callback::from(move |_: MouseEvent| on_cycle_mode.emit(id.clone()))
    };
    let on_remove = {
        let on_remove = props.on_remove.clone();
        let id = id.clone();
        Callback::from(move |_: MouseEvent| on_remove.emit(id.clone()))
    };

    let padding = if props.compact { "4px 8px" } else { "8px 12px" };
    let label = if props.show_name || !props.show_icon {
        site.name.clone()
    } else {
        String::new()
    };

    html! {
        <div class="site-row" style={format!("display: flex; align-items: center; gap: 8px; padding: {}; border-bottom: 1px solid #eee;", padding)}>
            <button
                class="site-open"
                title={site.url.clone()}
                onclick={onclick}
                style="display: flex; align-items: center; gap: 8px; flex: 1; min-width: 0; border: none; background: none; cursor: pointer; text-align: left;"
            >
                if props.show_icon {
                    <SiteIcon site={site.clone()} />
                }
                <span style="overflow: hidden; text-overflow: ellipsis; white-space: nowrap;">{label}</span>
            </button>
            <button class="site-mode" title="Change where this site opens" onclick={on_cycle}>
                {site.open_mode.label()}
            </button>
            <button class="site-move" title="Move up" disabled={!props.can_move_up} onclick={move_by(-1)}>{"▲"}</button>
            <button class="site-move" title="Move down" disabled={!props.can_move_down} onclick={move_by(1)}>{"▼"}</button>
            <button class="site-remove" title="Remove" onclick={on_remove}>{"✕"}</button>
        </div>
    }
}

#[derive(Properties, PartialEq)]
pub struct FrameToolbarProps {
    pub url_label: String,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub loading: bool,
    pub on_list: Callback<MouseEvent>,
    pub on_back: Callback<MouseEvent>,
    pub on_forward: Callback<MouseEvent>,
    pub on_refresh: Callback<MouseEvent>,
    pub on_copy: Callback<MouseEvent>,
    pub on_open_tab: Callback<MouseEvent>,
}

#[function_component(FrameToolbar)]
pub fn frame_toolbar(props: &FrameToolbarProps) -> Html {
    let button_style = "border: none; background: none; cursor: pointer; font-size: 14px; padding: 4px 6px;";

    html! {
        <div class="frame-toolbar" style="display: flex; align-items: center; gap: 2px; padding: 4px; border-bottom: 1px solid #ddd; background-color: #fafafa;">
            <button style={button_style} title="Back to list" onclick={props.on_list.clone()}>{"☰"}</button>
            <button style={button_style} title="Back" disabled={!props.can_go_back} onclick={props.on_back.clone()}>{"←"}</button>
            <button style={button_style} title="Forward" disabled={!props.can_go_forward} onclick={props.on_forward.clone()}>{"→"}</button>
            <button style={button_style} title="Refresh" disabled={props.loading} onclick={props.on_refresh.clone()}>{"⟳"}</button>
            <span
                class="current-url"
                title={props.url_label.clone()}
                onclick={props.on_copy.clone()}
                style="flex: 1; min-width: 0; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; font-size: 12px; color: #555; cursor: copy;"
            >
                {&props.url_label}
            </span>
            <button style={button_style} title="Copy URL" onclick={props.on_copy.clone()}>{"⧉"}</button>
            <button style={button_style} title="Open in new tab" onclick={props.on_open_tab.clone()}>{"↗"}</button>
        </div>
    }
}
