mod gateway;
mod health_check_api;
