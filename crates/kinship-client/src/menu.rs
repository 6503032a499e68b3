//! Popup menus: open/closed state plus the item policies for the account
//! switcher and the per-post actions.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use kinship_shared::{Identity, ProfileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuState {
    Closed,
    Open,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MenuError {
    #[error("Menu is not open")]
    NotOpen,

    #[error("Menu item {index} out of range (have {len})")]
    NoSuchItem { index: usize, len: usize },
}

/// A menu over items of type `T`. Starts closed; there is no terminal state.
#[derive(Debug, Clone)]
pub struct Menu<T> {
    state: MenuState,
    items: Vec<T>,
}

impl<T> Menu<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            state: MenuState::Closed,
            items,
        }
    }

    pub fn state(&self) -> MenuState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == MenuState::Open
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Swap the item set, e.g. after the active identity changed.
    pub fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
    }

    pub fn toggle(&mut self) -> MenuState {
        self.state = match self.state {
            MenuState::Closed => MenuState::Open,
            MenuState::Open => MenuState::Closed,
        };
        self.state
    }

    /// Close without running anything. No-op when already closed.
    pub fn dismiss(&mut self) {
        self.state = MenuState::Closed;
    }

    /// Run `action` on the chosen item and close the menu.
    ///
    /// Fails without touching the state when the menu is closed or `index`
    /// does not name an item.
    pub fn select_item<R>(
        &mut self,
        index: usize,
        action: impl FnOnce(&T) -> R,
    ) -> Result<R, MenuError> {
        if self.state != MenuState::Open {
            return Err(MenuError::NotOpen);
        }
        let item = self.items.get(index).ok_or(MenuError::NoSuchItem {
            index,
            len: self.items.len(),
        })?;
        let result = action(item);
        self.state = MenuState::Closed;
        debug!(index, "Menu item selected");
        Ok(result)
    }
}

impl<T> Default for Menu<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PostMenuItem {
    Delete,
    Report,
}

/// Authors may delete their own posts; everybody else may only report.
pub fn post_menu_items(viewer: Option<&ProfileId>, author: &ProfileId) -> Vec<PostMenuItem> {
    match viewer {
        Some(viewer) if viewer == author => vec![PostMenuItem::Delete],
        _ => vec![PostMenuItem::Report],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AccountMenuItem {
    LoggedInAs { handle: String },
    YourProfile { handle: String },
    Settings,
    Logout,
    #[serde(rename_all = "camelCase")]
    SwitchTo {
        index: usize,
        id: ProfileId,
        handle: String,
        is_active: bool,
    },
    IndexerStatus { active: bool },
}

/// Environment the account control is rendered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountMenuFlags {
    /// Identities are still being fetched.
    pub loading: bool,
    pub network_unsupported: bool,
    pub can_switch_network: bool,
    /// `None` when the indexer has not been probed.
    pub indexer_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "camelCase")]
pub enum AccountControl {
    Loading,
    Menu(Vec<AccountMenuItem>),
    SwitchNetwork,
    Login,
}

pub fn account_control(
    active: Option<&Identity>,
    identities: &[Identity],
    flags: AccountMenuFlags,
) -> AccountControl {
    if flags.loading {
        return AccountControl::Loading;
    }
    match active {
        Some(current) if !flags.network_unsupported => {
            AccountControl::Menu(account_menu_items(current, identities, flags.indexer_active))
        }
        _ if flags.network_unsupported && flags.can_switch_network => AccountControl::SwitchNetwork,
        _ => AccountControl::Login,
    }
}

fn account_menu_items(
    current: &Identity,
    identities: &[Identity],
    indexer_active: Option<bool>,
) -> Vec<AccountMenuItem> {
    let mut items = vec![
        AccountMenuItem::LoggedInAs {
            handle: current.handle.clone(),
        },
        AccountMenuItem::YourProfile {
            handle: current.handle.clone(),
        },
        AccountMenuItem::Settings,
        AccountMenuItem::Logout,
    ];
    items.extend(
        identities
            .iter()
            .enumerate()
            .map(|(index, profile)| AccountMenuItem::SwitchTo {
                index,
                id: profile.id.clone(),
                handle: profile.handle.clone(),
                is_active: profile.is(&current.id),
            }),
    );
    if let Some(active) = indexer_active {
        items.push(AccountMenuItem::IndexerStatus { active });
    }
    items
}
