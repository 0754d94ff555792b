//! Deployment-mode coverage for the built-in rule table.

use memwatch::process::{default_rules, ProcessClassifier, ProcessDescriptor, RuleEntry};
use memwatch::roles::Role;

fn classifier() -> ProcessClassifier {
    ProcessClassifier::new(&default_rules()).unwrap()
}

#[test]
fn test_every_deployment_mode_resolves_to_the_same_role() {
    let c = classifier();
    let service = [
        "/Applications/Pastewise.app/Contents/MacOS/pastewise-agent",
        "C:\\Program Files\\Pastewise\\pastewise-agent.exe --tray=0",
        "/usr/bin/pastewise-agent --foreground",
        "/usr/bin/python3 -m pastewise.agent",
        "python pastewise_agent.py --debug",
        "/opt/venv/bin/python3.11 /home/u/src/PasteWise_Agent.py",
    ];
    let supervisor = [
        "/Applications/Pastewise.app/Contents/MacOS/pastewise-agent-menu",
        "C:\\Program Files\\Pastewise\\pastewise-agent-menu.exe",
        "/usr/bin/python3 -m pastewise.agent_menu",
        "python pastewise_agent_menu.py",
    ];

    for cmd in service {
        assert_eq!(c.classify_cmdline(cmd), Some(Role::Service), "{}", cmd);
    }
    for cmd in supervisor {
        assert_eq!(c.classify_cmdline(cmd), Some(Role::Supervisor), "{}", cmd);
    }
}

#[test]
fn test_unrelated_processes_match_nothing() {
    let c = classifier();
    for cmd in ["/usr/sbin/sshd -D", "vim pastewise_notes.txt", "", "   "] {
        assert_eq!(c.classify_cmdline(cmd), None, "{:?}", cmd);
    }
}

#[test]
fn test_classify_maps_pids_and_omits_non_matches() {
    let c = classifier();
    let procs = vec![
        ProcessDescriptor { pid: 10, cmdline: "/usr/bin/pastewise-agent".into(), ppid: 1 },
        ProcessDescriptor { pid: 11, cmdline: "/usr/bin/pastewise-agent-menu".into(), ppid: 10 },
        ProcessDescriptor { pid: 12, cmdline: "bash".into(), ppid: 1 },
    ];
    let roles = c.classify(&procs);
    assert_eq!(roles.len(), 2);
    assert_eq!(roles.get(&10), Some(&Role::Service));
    assert_eq!(roles.get(&11), Some(&Role::Supervisor));
    assert!(!roles.contains_key(&12));
}

#[test]
fn test_custom_table_with_regex() {
    let rules = vec![
        RuleEntry {
            regex: Some(r"worker-\d+$".to_string()),
            ..RuleEntry::new(Role::Service, 1, &[], &[])
        },
        RuleEntry::new(Role::Supervisor, 2, &["overseer"], &[]),
    ];
    let c = ProcessClassifier::new(&rules).unwrap();
    assert_eq!(c.classify_cmdline("/srv/bin/Worker-12"), Some(Role::Service));
    assert_eq!(c.classify_cmdline("/srv/bin/worker-12 --x"), None);
    assert_eq!(c.classify_cmdline("OVERSEER"), Some(Role::Supervisor));
}
