use std::collections::BTreeMap;

use super::*;
use crate::domain::{
    ActTrace, ActionGroupId, ActionId, ActionMeta, FactionId, FactionMeta, GameMeta, Message,
    MessageInfo, NightResult, Phase, PlanEntry, PlannedAct, PlayerMeta, PlayerRecord, Schedule,
};

fn meta() -> GameMeta {
    let mut players = BTreeMap::new();
    players.insert(
        PlayerId(1),
        PlayerMeta {
            name: "alice".to_string(),
            role: "cop".to_string(),
            abilities: vec!["investigate one player each night".to_string()],
            will: String::new(),
        },
    );
    players.insert(
        PlayerId(2),
        PlayerMeta {
            name: "bob".to_string(),
            role: "goon".to_string(),
            abilities: Vec::new(),
            will: "avenge me".to_string(),
        },
    );
    players.insert(
        PlayerId(3),
        PlayerMeta {
            name: "carol".to_string(),
            role: "villager".to_string(),
            abilities: Vec::new(),
            will: String::new(),
        },
    );

    let mut factions = BTreeMap::new();
    factions.insert(
        FactionId(1),
        FactionMeta {
            name: "Town".to_string(),
            agenda: "eliminate the mafia".to_string(),
            translations: BTreeMap::new(),
            is_primary: true,
            members_visible: false,
        },
    );
    let mut mafia_translations = BTreeMap::new();
    mafia_translations.insert("goon".to_string(), "Mafioso".to_string());
    mafia_translations.insert("vanilla".to_string(), "Mook".to_string());
    factions.insert(
        FactionId(2),
        FactionMeta {
            name: "Mafia".to_string(),
            agenda: "outnumber the town".to_string(),
            translations: mafia_translations,
            is_primary: true,
            members_visible: true,
        },
    );

    let mut actions = BTreeMap::new();
    actions.insert(
        ActionId(10),
        ActionMeta {
            command: "investigate $0".to_string(),
            description: "learn a player's alignment".to_string(),
            ninja: false,
        },
    );
    actions.insert(
        ActionId(11),
        ActionMeta {
            command: "kill $0".to_string(),
            description: "eliminate a player".to_string(),
            ninja: false,
        },
    );
    actions.insert(
        ActionId(12),
        ActionMeta {
            command: "lurk".to_string(),
            description: "hidden passive".to_string(),
            ninja: true,
        },
    );

    GameMeta {
        name: "testville".to_string(),
        motd: Some("be kind".to_string()),
        secret: "c2VjcmV0LXNlY3JldC1zZWNyZXQtc2VjcmV0".to_string(),
        phase: Phase::Night,
        schedule: Schedule {
            night_end: "10:00:00".to_string(),
            day_end: "22:00:00".to_string(),
            twilight_secs: 120,
            utc_offset: "+00:00".to_string(),
            phase_end: Some(1_700_000_000),
        },
        players,
        factions,
        actions,
    }
}

fn records() -> BTreeMap<PlayerId, PlayerRecord> {
    let mut players = BTreeMap::new();
    players.insert(
        PlayerId(1),
        PlayerRecord {
            faction: FactionId(1),
            death: None,
            friends: Vec::new(),
            cohorts: Vec::new(),
            vanillaized: false,
        },
    );
    players.insert(
        PlayerId(2),
        PlayerRecord {
            faction: FactionId(2),
            death: None,
            friends: vec![PlayerId(3)],
            cohorts: vec![PlayerId(3)],
            vanillaized: false,
        },
    );
    players.insert(
        PlayerId(3),
        PlayerRecord {
            faction: FactionId(1),
            death: None,
            friends: Vec::new(),
            cohorts: Vec::new(),
            vanillaized: false,
        },
    );
    players
}

fn plan_entry(group: u32, action: u32, source: u32, targets: Option<Vec<u32>>) -> PlanEntry {
    PlanEntry {
        action_group: ActionGroupId(group),
        action: ActionId(action),
        source: PlayerId(source),
        act: targets.map(|t| PlannedAct {
            targets: t.into_iter().map(PlayerId).collect(),
            trace: ActTrace::FromPlan {
                action_group: ActionGroupId(group),
            },
        }),
        candidates: vec![vec![PlayerId(1), PlayerId(2), PlayerId(3)]],
        available: true,
        compulsion: Compulsion::Voluntary,
    }
}

#[test]
fn identical_inputs_project_to_identical_bytes() {
    let meta = meta();
    let players = records();
    let ctx = ProjectionCtx {
        meta: &meta,
        players: &players,
    };

    let a = public_view(ctx, 3);
    let b = public_view(ctx, 3);
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_vec(&a).unwrap(),
        serde_json::to_vec(&b).unwrap()
    );

    let ia = identity_view(ctx, PlayerId(2));
    let ib = identity_view(ctx, PlayerId(2));
    assert_eq!(
        serde_json::to_vec(&ia).unwrap(),
        serde_json::to_vec(&ib).unwrap()
    );
}

#[test]
fn flips_show_roles_only_for_the_dead() {
    let meta = meta();
    let mut players = records();
    players.get_mut(&PlayerId(2)).unwrap().death = Some("lynched".to_string());
    let ctx = ProjectionCtx {
        meta: &meta,
        players: &players,
    };

    let view = public_view(ctx, 2);
    assert_eq!(view.flips["bob"], Some("goon".to_string()));
    assert_eq!(view.flips["alice"], None);
    assert_eq!(view.flips["carol"], None);
}

#[test]
fn wills_become_public_on_death() {
    let meta = meta();
    let mut players = records();
    players.get_mut(&PlayerId(2)).unwrap().death = Some("lynched".to_string());
    let ctx = ProjectionCtx {
        meta: &meta,
        players: &players,
    };

    let view = public_view(ctx, 2);
    assert_eq!(view.wills["bob"], "avenge me");
    assert!(!view.wills.contains_key("alice"));
}

#[test]
fn faction_translations_shape_the_displayed_role() {
    let meta = meta();
    let mut players = records();
    let ctx = ProjectionCtx {
        meta: &meta,
        players: &players,
    };
    assert_eq!(display_role(ctx, PlayerId(2)), "Mafioso");
    assert_eq!(display_role(ctx, PlayerId(1)), "cop");

    players.get_mut(&PlayerId(2)).unwrap().vanillaized = true;
    let ctx = ProjectionCtx {
        meta: &meta,
        players: &players,
    };
    assert_eq!(display_role(ctx, PlayerId(2)), "Mook");
}

#[test]
fn cohorts_hidden_unless_faction_reveals_members() {
    let meta = meta();
    let mut players = records();
    let ctx = ProjectionCtx {
        meta: &meta,
        players: &players,
    };

    // Mafia reveals membership.
    let view = identity_view(ctx, PlayerId(2));
    assert_eq!(view.cohorts, vec!["carol".to_string()]);
    assert_eq!(view.friends, vec!["carol".to_string()]);
    assert_eq!(view.will, "avenge me");

    // Town does not, even if the engine reported cohorts.
    players.get_mut(&PlayerId(1)).unwrap().cohorts = vec![PlayerId(3)];
    let ctx = ProjectionCtx {
        meta: &meta,
        players: &players,
    };
    let view = identity_view(ctx, PlayerId(1));
    assert!(view.cohorts.is_empty());
}

#[test]
fn plan_filter_keeps_only_the_viewers_entries_in_order() {
    let entries = vec![
        plan_entry(1, 10, 1, None),
        plan_entry(2, 11, 2, Some(vec![3])),
        plan_entry(3, 12, 1, None),
    ];

    let mine = filter_plan(&entries, PlayerId(1));
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].action_group, ActionGroupId(1));
    assert_eq!(mine[1].action_group, ActionGroupId(3));

    let meta = meta();
    let views = plan_view(&meta, &mine);
    assert_eq!(views[0].command, "investigate $0");
    assert_eq!(views[0].targets, None);
    assert_eq!(
        views[0].candidates,
        vec![vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]]
    );
}

#[test]
fn ballot_view_lists_every_living_player() {
    let meta = meta();
    let mut players = records();
    players.get_mut(&PlayerId(3)).unwrap().death = Some("killed in the night".to_string());
    let ctx = ProjectionCtx {
        meta: &meta,
        players: &players,
    };

    let mut ballot = BTreeMap::new();
    ballot.insert(PlayerId(1), Some(PlayerId(2)));

    let view = ballot_view(ctx, &ballot);
    assert_eq!(view.candidates, vec!["alice".to_string(), "bob".to_string()]);
    assert_eq!(view.votes["alice"], Some("bob".to_string()));
    assert_eq!(view.votes["bob"], None);
    assert!(!view.votes.contains_key("carol"));
}

#[test]
fn night_result_scopes_messages_and_plan_to_the_viewer() {
    let meta = meta();
    let result = NightResult {
        used_plan: vec![
            plan_entry(1, 10, 1, Some(vec![2])),
            plan_entry(2, 11, 2, Some(vec![3])),
        ],
        messages: vec![
            Message {
                recipient: PlayerId(1),
                info: MessageInfo::Investigation { result: true },
                act_trace: Some(ActTrace::FromPlan {
                    action_group: ActionGroupId(1),
                }),
            },
            Message {
                recipient: PlayerId(2),
                info: MessageInfo::Greeting,
                act_trace: None,
            },
        ],
        deaths: {
            let mut deaths = BTreeMap::new();
            deaths.insert(PlayerId(3), "killed in the night".to_string());
            deaths
        },
    };

    let view = night_result_view(&meta, &result, PlayerId(1));
    assert_eq!(view.used_plan.len(), 1);
    assert_eq!(view.used_plan[0].targets, Some(vec!["bob".to_string()]));
    assert_eq!(view.messages.len(), 1);
    // The investigation is tied back to slot 0 of alice's own plan.
    assert_eq!(view.messages[0].i, Some(0));
    assert_eq!(
        view.messages[0].info,
        MessageInfoView::Investigation { result: true }
    );
    assert_eq!(view.deaths["carol"], "killed in the night");
}

#[test]
fn action_listings_dedup_and_hide_ninja_actions() {
    let meta = meta();
    let message = Message {
        recipient: PlayerId(1),
        info: MessageInfo::Actions {
            actions: vec![ActionId(10), ActionId(10), ActionId(12), ActionId(11)],
        },
        act_trace: None,
    };

    let view = message_view(&meta, &[], &message);
    assert_eq!(
        view.info,
        MessageInfoView::Actions {
            commands: vec!["investigate $0".to_string(), "kill $0".to_string()]
        }
    );
}

#[test]
fn command_templates_substitute_targets() {
    assert_eq!(
        render_command("swap $0 with $1", &["bob".to_string(), "carol".to_string()]),
        "swap bob with carol"
    );
    assert_eq!(render_command("lurk", &[]), "lurk");
    // Out-of-range slots are left as written.
    assert_eq!(render_command("kill $3", &["bob".to_string()]), "kill $3");
}

#[test]
fn peek_lists_submitted_acts_with_rendered_commands() {
    let meta = meta();
    let entries = vec![
        plan_entry(1, 10, 1, Some(vec![2])),
        plan_entry(2, 11, 2, None),
    ];

    assert_eq!(peek_lines(&meta, &entries), "alice: investigate bob");
}
