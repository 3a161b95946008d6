//! The end-to-end grab workflow as a linear stage pipeline.
//!
//! Each stage composes the locator resolver and action executor, carries an
//! explicit required/optional policy, and falls back to a bottom-navigation
//! tap plus one more primary attempt when its locators miss. Optional stages
//! that fail are logged and skipped; a required stage that fails aborts the
//! run and propagates to the session retry controller.
//!
//! After the deadline wait the pipeline never blocks on perfect resolution:
//! partial attendee selection or a missed confirm dialog is tolerated and the
//! run pushes on, because stalling past the on-sale instant forfeits the
//! whole attempt.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::batch::{BatchCoordinator, BatchItem};
use crate::config::{RunConfig, Timings};
use crate::deadline::DeadlineSynchronizer;
use crate::element::ResolvedTarget;
use crate::executor::ActionExecutor;
use crate::locator::{Locator, LocatorList};
use crate::resolver::{LocatorResolver, Resolution};
use crate::session::{AutomationSession, SessionError};

/// Package identifier of the app under automation.
pub const APP_PACKAGE: &str = "cn.damai";
/// Launch activity of the app under automation.
pub const APP_ACTIVITY: &str = ".launcher.splash.SplashMainActivity";

/// Label marking a sold-out tier that only offers a restock registration.
const UNAVAILABLE_MARKER: &str = "缺货登记";

/// Stage-level failure that aborts the run.
#[derive(Error, Debug)]
pub enum FlowError {
    /// A required stage exhausted its locators and fallbacks.
    #[error("required stage '{stage}' failed: {reason}")]
    StageFailed { stage: &'static str, reason: String },

    /// A transport fault that stage logic cannot absorb.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// One named unit of the pipeline: locators plus a required/optional policy.
#[derive(Debug, Clone)]
pub struct WorkflowStage {
    pub name: &'static str,
    pub locators: LocatorList,
    pub required: bool,
}

impl WorkflowStage {
    pub fn required(name: &'static str, locators: impl Into<LocatorList>) -> Self {
        Self {
            name,
            locators: locators.into(),
            required: true,
        }
    }

    pub fn optional(name: &'static str, locators: impl Into<LocatorList>) -> Self {
        Self {
            name,
            locators: locators.into(),
            required: false,
        }
    }
}

/// What a completed run actually did.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Attendees whose checkboxes were tapped, in input order.
    pub attendees_selected: Vec<String>,
    /// False when `if_commit_order` suppressed the final submit tap.
    pub submitted: bool,
}

/// Drives the full stage sequence against one live session.
pub struct WorkflowController<'a> {
    session: &'a dyn AutomationSession,
    config: &'a RunConfig,
    timings: Timings,
    deadline: DeadlineSynchronizer,
    /// Subtracted from the deadline before the in-run wait releases.
    lead: Duration,
}

impl<'a> WorkflowController<'a> {
    pub fn new(
        session: &'a dyn AutomationSession,
        config: &'a RunConfig,
        timings: Timings,
        deadline: DeadlineSynchronizer,
        lead: Duration,
    ) -> Self {
        Self {
            session,
            config,
            timings,
            deadline,
            lead,
        }
    }

    fn resolver(&self) -> LocatorResolver<'a> {
        LocatorResolver::new(self.session, self.timings)
    }

    fn executor(&self) -> ActionExecutor<'a> {
        ActionExecutor::new(self.session, self.timings)
    }

    /// Run the pipeline start to finish.
    pub async fn run(&self) -> Result<RunReport, FlowError> {
        self.ensure_app_foreground().await;

        self.tap_stage(&WorkflowStage::optional("featured_tab", featured_tab_locators()))
            .await?;
        self.open_search_and_enter_keyword().await?;
        self.open_first_result().await?;
        self.select_city().await?;

        let deadline = self.config.deadline().map_err(|e| FlowError::StageFailed {
            stage: "deadline_wait",
            reason: e.to_string(),
        })?;
        let released = self.deadline.wait_until(deadline, self.lead).await;
        info!(%released, "deadline reached, entering purchase stages");

        self.tap_buy_button().await?;
        self.select_date().await?;
        self.select_ticket_tier().await?;
        self.adjust_quantity().await?;
        self.tap_stage(&WorkflowStage::optional("confirm_selection", confirm_locators()))
            .await?;
        let attendees_selected = self.select_attendees().await;
        let submitted = self.submit_order().await?;

        Ok(RunReport {
            attendees_selected,
            submitted,
        })
    }

    // -----------------------------------------------------------------------
    // Stage mechanics
    // -----------------------------------------------------------------------

    /// Resolve-and-tap with the standard fallback policy: primary locators,
    /// then a bottom-navigation tap followed by one more primary pass.
    ///
    /// Returns whether the stage landed. Required stages turn a miss into
    /// [`FlowError::StageFailed`].
    async fn tap_stage(&self, stage: &WorkflowStage) -> Result<bool, FlowError> {
        if self.resolve_and_tap(&stage.locators).await {
            info!(stage = stage.name, "stage complete");
            return Ok(true);
        }

        debug!(stage = stage.name, "primary locators missed, trying navigation fallback");
        if self.resolve_and_tap(&bottom_nav_locators()).await {
            tokio::time::sleep(self.timings.inter_action_delay).await;
            if self.resolve_and_tap(&stage.locators).await {
                info!(stage = stage.name, "stage complete after navigation fallback");
                return Ok(true);
            }
        }

        if stage.required {
            Err(FlowError::StageFailed {
                stage: stage.name,
                reason: "no locator candidate resolved".to_string(),
            })
        } else {
            warn!(stage = stage.name, "optional stage skipped");
            Ok(false)
        }
    }

    /// First-success combinator over resolution plus the technique cascade.
    async fn resolve_and_tap(&self, locators: &LocatorList) -> bool {
        match self.resolver().resolve(locators).await {
            Resolution::Found(target) => self.executor().tap(&target).await.succeeded(),
            Resolution::NotFound => false,
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Bring the target app to the foreground if it is not already.
    async fn ensure_app_foreground(&self) {
        match self.session.current_foreground_app().await {
            Ok(package) if package == APP_PACKAGE => {
                debug!("app already in foreground");
            }
            Ok(package) => {
                info!(%package, "foreground app differs, activating target");
                if let Err(e) = self.session.activate_app(APP_PACKAGE).await {
                    warn!(error = %e, "app activation failed, continuing");
                }
            }
            Err(e) => {
                warn!(error = %e, "foreground check failed, continuing");
            }
        }
    }

    /// Open the search surface and type the keyword.
    async fn open_search_and_enter_keyword(&self) -> Result<(), FlowError> {
        let opened = self
            .tap_stage(&WorkflowStage::optional("open_search", search_box_locators()))
            .await?;
        if !opened {
            // The result stage may still match if a previous run left the
            // search surface open.
            return Ok(());
        }

        if let Err(e) = self.session.type_text(&self.config.keyword).await {
            warn!(error = %e, "keyword entry failed");
            return Ok(());
        }
        info!(keyword = %self.config.keyword, "keyword entered");

        if !self.resolve_and_tap(&search_button_locators()).await {
            // Fall back to the IME action: a trailing newline submits.
            if let Err(e) = self.session.type_text("\n").await {
                warn!(error = %e, "search submission failed");
            }
        }
        Ok(())
    }

    /// Activate the first matching search result and verify arrival at the
    /// detail surface. Required: without a detail surface nothing else works.
    async fn open_first_result(&self) -> Result<(), FlowError> {
        let locators = result_locators(&self.config.keyword);
        if self.resolve_and_tap(&locators).await && self.verify_detail_page().await {
            info!("detail surface reached");
            return Ok(());
        }

        // No structural match: sweep likely result regions top to bottom.
        let (width, height) = self.session.window_size().await?;
        for fraction in [0.25, 0.30, 0.35, 0.40] {
            let x = width / 2;
            let y = (height as f64 * fraction) as i32;
            if self.executor().tap_point(x, y).await.is_ok() {
                tokio::time::sleep(self.timings.inter_action_delay).await;
                if self.verify_detail_page().await {
                    info!(x, y, "detail surface reached via region tap");
                    return Ok(());
                }
            }
        }

        Err(FlowError::StageFailed {
            stage: "open_first_result",
            reason: "no search result led to the detail surface".to_string(),
        })
    }

    /// Detail-surface arrival check: any one indicator element suffices.
    async fn verify_detail_page(&self) -> bool {
        self.resolver()
            .resolve(&detail_indicator_locators())
            .await
            .is_found()
    }

    /// City selection on the detail surface. Optional: single-city tours have
    /// nothing to pick.
    async fn select_city(&self) -> Result<(), FlowError> {
        let stage = WorkflowStage::optional("select_city", city_locators(&self.config.city));
        if self.tap_stage(&stage).await? {
            info!(city = %self.config.city, "city selected");
        }
        Ok(())
    }

    /// The primary transaction button has no stable locator; walk a
    /// descending-priority list of screen-relative positions. Required.
    async fn tap_buy_button(&self) -> Result<(), FlowError> {
        let (width, height) = self.session.window_size().await?;
        let positions: [(f64, f64); 8] = [
            (0.90, 0.95),
            (0.85, 0.95),
            (0.90, 0.90),
            (0.80, 0.95),
            (0.70, 0.95),
            (0.60, 0.95),
            (0.50, 0.95),
            (0.50, 0.90),
        ];

        for (i, (fx, fy)) in positions.iter().enumerate() {
            let x = (width as f64 * fx) as i32;
            let y = (height as f64 * fy) as i32;
            match self.executor().tap_point(x, y).await {
                Ok(()) => {
                    info!(position = i, x, y, "buy button tapped");
                    return Ok(());
                }
                Err(e) => {
                    debug!(position = i, x, y, error = %e, "buy position failed");
                }
            }
        }

        Err(FlowError::StageFailed {
            stage: "tap_buy_button",
            reason: "every buy-button position failed".to_string(),
        })
    }

    /// Pick the configured show date, falling back to a generic tap in the
    /// session-list region when no date locator resolves. Optional: some
    /// shows skip straight to tier selection.
    async fn select_date(&self) -> Result<(), FlowError> {
        let locators = date_locators(&self.config.date);
        if self.resolve_and_tap(&locators).await {
            info!(date = %self.config.date, "date selected");
            return Ok(());
        }

        warn!("no date locator resolved, tapping session-list region");
        let (width, height) = self.session.window_size().await?;
        if let Err(e) = self
            .executor()
            .tap_point(width / 2, (height as f64 * 0.4) as i32)
            .await
        {
            warn!(error = %e, "session-list region tap failed");
        }
        Ok(())
    }

    /// Resolve all price tiers, drop the sold-out ones, and tap the pick.
    /// Required: no tier means no order.
    async fn select_ticket_tier(&self) -> Result<(), FlowError> {
        let resolver = self.resolver();

        let mut handles = Vec::new();
        for locator in tier_list_locators() {
            handles = resolver.resolve_all(&locator, self.timings.locate_timeout).await;
            if !handles.is_empty() {
                debug!(%locator, count = handles.len(), "tier candidates listed");
                break;
            }
        }
        if handles.is_empty() {
            return Err(FlowError::StageFailed {
                stage: "select_ticket_tier",
                reason: "no price tier resolved".to_string(),
            });
        }

        // Pair each tier with its text; unreadable text is kept rather than
        // dropped, since past the deadline a blind pick beats no pick.
        let mut available = Vec::new();
        for handle in handles {
            let text = self
                .session
                .element_text(&handle)
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            if text.contains(UNAVAILABLE_MARKER) {
                debug!(%text, "tier unavailable, filtered");
            } else {
                available.push((handle, text));
            }
        }
        if available.is_empty() {
            return Err(FlowError::StageFailed {
                stage: "select_ticket_tier",
                reason: "every tier is sold out".to_string(),
            });
        }

        // Preference order: configured price label, then price_index, then
        // the first available tier.
        let pick = available
            .iter()
            .position(|(_, text)| !self.config.price.is_empty() && text.contains(&self.config.price))
            .or_else(|| (self.config.price_index < available.len()).then_some(self.config.price_index))
            .unwrap_or(0);
        let (handle, text) = &available[pick];
        info!(tier = %text, index = pick, "tier chosen");

        let rect = self.session.element_rect(handle).await.unwrap_or(
            crate::element::ElementRect::at_point(0, 0),
        );
        let target = ResolvedTarget {
            handle: Some(handle.clone()),
            rect,
            candidate_index: pick,
        };
        if self.executor().tap(&target).await.succeeded() {
            Ok(())
        } else {
            Err(FlowError::StageFailed {
                stage: "select_ticket_tier",
                reason: "tier tap cascade exhausted".to_string(),
            })
        }
    }

    /// Raise the quantity to one ticket per attendee by tapping the
    /// increment control. Skipped entirely at quantity one.
    async fn adjust_quantity(&self) -> Result<(), FlowError> {
        let quantity = self.config.quantity();
        if quantity == 1 {
            debug!("single attendee, quantity stage skipped");
            return Ok(());
        }

        let increments = quantity - 1;
        match self.resolver().resolve(&plus_button_locators()).await {
            Resolution::Found(target) => {
                for i in 0..increments {
                    if !self.executor().tap(&target).await.succeeded() {
                        warn!(done = i, wanted = increments, "increment tap failed, quantity may be short");
                        break;
                    }
                    tokio::time::sleep(self.timings.inter_action_delay).await;
                }
                info!(increments, "quantity adjusted");
            }
            Resolution::NotFound => {
                // Attendee selection tolerates a short quantity downstream.
                warn!("increment control not found, quantity stage skipped");
            }
        }
        Ok(())
    }

    /// Tap every attendee checkbox via the batch coordinator. Partial
    /// success is accepted and reported, never fatal.
    async fn select_attendees(&self) -> Vec<String> {
        let items: Vec<BatchItem> = self
            .config
            .users
            .iter()
            .map(|user| BatchItem::new(user.clone(), attendee_locators(user)))
            .collect();

        let batch = BatchCoordinator::new(self.session, self.timings);
        let selected = batch.tap_all(&items).await;
        if selected.len() < self.config.users.len() {
            warn!(
                selected = selected.len(),
                requested = self.config.users.len(),
                "attendee selection incomplete, proceeding"
            );
        }
        selected
    }

    /// Final submission, honoring the commit flag.
    async fn submit_order(&self) -> Result<bool, FlowError> {
        if !self.config.if_commit_order {
            info!("commit flag off, dry run ends before submission");
            return Ok(false);
        }

        let submitted = self
            .tap_stage(&WorkflowStage::optional("submit_order", submit_locators()))
            .await?;
        if submitted {
            info!("order submitted");
        }
        Ok(submitted)
    }
}

// ---------------------------------------------------------------------------
// Locator candidate lists, priority order recovered from the live app
// ---------------------------------------------------------------------------

fn featured_tab_locators() -> Vec<Locator> {
    vec![
        Locator::text("精选"),
        Locator::text_contains("精选"),
        Locator::xpath("//android.widget.TextView[@text=\"精选\"]"),
        Locator::xpath("//*[contains(@text, \"精选\")]"),
    ]
}

fn bottom_nav_locators() -> LocatorList {
    LocatorList::new(vec![
        Locator::text("首页"),
        Locator::text("我的"),
        Locator::text("发现"),
        Locator::xpath("//android.widget.TextView[@text=\"首页\"]"),
        Locator::xpath("//android.widget.TextView[@text=\"我的\"]"),
        Locator::xpath("//android.widget.TextView[@text=\"发现\"]"),
    ])
}

fn search_box_locators() -> Vec<Locator> {
    vec![
        Locator::text_contains("搜索"),
        Locator::id("cn.damai:id/search_bar"),
        Locator::xpath("//*[contains(@text, \"搜索\")]"),
    ]
}

fn search_button_locators() -> LocatorList {
    LocatorList::new(vec![
        Locator::text("搜索"),
        Locator::xpath("//android.widget.TextView[@text=\"搜索\"]"),
    ])
}

fn result_locators(keyword: &str) -> LocatorList {
    LocatorList::new(vec![
        // Keyword-specific candidates outrank the generic first-item ones.
        Locator::xpath(format!(
            "//android.widget.TextView[contains(@text, \"{keyword}\")]/parent::*"
        )),
        Locator::text_contains(keyword),
        Locator::xpath("//android.widget.LinearLayout[@resource-id=\"cn.damai:id/ll_search_item\"][1]"),
        Locator::xpath("//android.widget.TextView[@resource-id=\"cn.damai:id/item_title\"][1]"),
        Locator::xpath("//android.widget.ListView/android.widget.LinearLayout[1]"),
        Locator::xpath("//android.widget.RecyclerView/android.widget.LinearLayout[1]"),
        Locator::Query(
            "new UiSelector().className(\"android.widget.ListView\").childSelector(new UiSelector().index(0))"
                .to_string(),
        ),
        Locator::Query(
            "new UiSelector().className(\"android.widget.RecyclerView\").childSelector(new UiSelector().index(0))"
                .to_string(),
        ),
    ])
}

fn detail_indicator_locators() -> LocatorList {
    LocatorList::new(vec![
        Locator::id("cn.damai:id/detail_title"),
        Locator::id("cn.damai:id/detail_subtitle"),
        Locator::id("cn.damai:id/detail_time"),
        Locator::id("cn.damai:id/detail_address"),
        Locator::xpath(
            "//android.widget.Button[contains(@text, \"立即购买\") or contains(@text, \"确定\")]",
        ),
        Locator::xpath(
            "//android.widget.TextView[contains(@text, \"场次\") or contains(@text, \"票档\")]",
        ),
    ])
}

fn city_locators(city: &str) -> Vec<Locator> {
    vec![
        Locator::xpath(format!("//android.widget.TextView[@text=\"{city}\"]")),
        Locator::text(city),
        Locator::xpath(format!("//android.widget.TextView[contains(@text, \"{city}\")]")),
        Locator::text_contains(city),
        Locator::xpath(format!("//*[contains(@text, \"{city}\")]/parent::*")),
        Locator::Query(format!("new UiSelector().descriptionContains(\"{city}\")")),
        Locator::xpath(format!(
            "//android.view.View[contains(@content-desc, \"{city}\")]"
        )),
        Locator::xpath(format!(
            "//android.widget.TextView[@text=\"{city}\"]/parent::android.view.ViewGroup"
        )),
    ]
}

fn date_locators(date: &str) -> LocatorList {
    // Month-day fragment, e.g. "11-01" from "2025-11-01".
    let month_day = date.splitn(2, '-').nth(1).unwrap_or(date).to_string();
    LocatorList::new(vec![
        Locator::xpath(format!(
            "//android.widget.TextView[starts-with(@text, \"{date}\")]"
        )),
        Locator::xpath(format!("//android.widget.TextView[contains(@text, \"{date}\")]")),
        Locator::text_contains(date),
        Locator::xpath(format!(
            "//android.widget.TextView[contains(@text, \"{month_day}\")]"
        )),
        Locator::xpath(
            "//android.view.ViewGroup//android.widget.TextView[contains(@text, \"周\") and contains(@text, \":\")]",
        ),
        Locator::xpath("//android.widget.TextView[contains(@resource-id, \"dateItemText\")]"),
        Locator::xpath("//android.widget.TextView[contains(@resource-id, \"date\")]"),
    ])
}

fn tier_list_locators() -> Vec<Locator> {
    vec![
        Locator::xpath("//android.widget.TextView[contains(@text, \"元\")]/../.."),
        Locator::xpath("//android.widget.TextView[contains(@text, \"票档\")]/../.."),
        Locator::xpath("//android.widget.TextView[contains(@text, \"¥\")]/../.."),
        Locator::xpath("//android.view.ViewGroup[contains(@resource-id, \"item_container\")]"),
        Locator::text_contains("¥"),
    ]
}

fn plus_button_locators() -> LocatorList {
    LocatorList::new(vec![
        Locator::xpath("//android.widget.TextView[contains(@text, \"+\")]"),
        Locator::xpath("//android.widget.Button[contains(@resource-id, \"plus\")]"),
        Locator::xpath("//android.widget.ImageView[contains(@resource-id, \"plus\")]"),
        Locator::xpath("//android.view.View[contains(@resource-id, \"plus\")]"),
    ])
}

fn confirm_locators() -> Vec<Locator> {
    vec![
        Locator::Query("new UiSelector().textMatches(\".*确定.*|.*购买.*\")".to_string()),
        Locator::xpath("//android.widget.Button[contains(@text, \"确定\")]"),
        Locator::xpath("//android.widget.TextView[contains(@text, \"确定\")]"),
        Locator::id("btn_buy_view"),
    ]
}

fn attendee_locators(user: &str) -> LocatorList {
    LocatorList::new(vec![
        Locator::xpath(format!(
            "//android.widget.CheckBox[..//*[contains(@text, \"{user}\")]]"
        )),
        Locator::xpath(format!(
            "//*[contains(@text, \"{user}\")]/preceding-sibling::android.widget.CheckBox"
        )),
        Locator::text_contains(user),
    ])
}

fn submit_locators() -> Vec<Locator> {
    vec![
        Locator::text("立即提交"),
        Locator::Query("new UiSelector().textMatches(\".*提交.*|.*确认.*\")".to_string()),
        Locator::xpath("//*[contains(@text,\"提交\")]"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_locators_interpolate_keyword() {
        let locators = result_locators("刘若英");
        assert!(locators.iter().any(|l| l.value().contains("刘若英")));
        // Keyword candidates precede the generic first-item ones.
        assert!(locators.0[0].value().contains("刘若英"));
    }

    #[test]
    fn date_locators_include_month_day_fragment() {
        let locators = date_locators("2025-11-01");
        assert!(locators.iter().any(|l| l.value().contains("11-01")
            && !l.value().contains("2025")));
    }

    #[test]
    fn stage_policy_flags() {
        let stage = WorkflowStage::required("x", vec![Locator::text("a")]);
        assert!(stage.required);
        let stage = WorkflowStage::optional("x", vec![Locator::text("a")]);
        assert!(!stage.required);
    }

    #[test]
    fn attendee_locators_prefer_checkbox_ancestry() {
        let locators = attendee_locators("张三");
        assert!(locators.0[0].value().contains("CheckBox"));
        assert!(locators.0[0].value().contains("张三"));
    }
}
