//! Task management commands for CLI.

use clap::Subcommand;
use tasker_core::{Database, Task, TaskId};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a new task
    Add {
        /// Task title
        title: String,
    },
    /// List tasks, open ones first
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a task as done
    Done {
        /// Task ID
        id: TaskId,
    },
    /// Mark a task as not done
    Undone {
        /// Task ID
        id: TaskId,
    },
    /// Delete a task. Its focus sessions are kept.
    Delete {
        /// Task ID
        id: TaskId,
    },
}

fn print_line(task: &Task) {
    let mark = if task.done { "x" } else { " " };
    println!("[{mark}] {:>4}  {}", task.id, task.title);
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        TaskAction::Add { title } => {
            let task = db.add_task(&title)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List { json } => {
            let tasks = db.list_tasks()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("no tasks");
            } else {
                tasks.iter().for_each(print_line);
            }
        }
        TaskAction::Done { id } => {
            let task = db.set_task_done(id, true)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::Undone { id } => {
            let task = db.set_task_done(id, false)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::Delete { id } => {
            db.delete_task(id)?;
            println!("task {id} deleted");
        }
    }
    Ok(())
}
