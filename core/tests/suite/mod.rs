mod guard;
mod manage;
